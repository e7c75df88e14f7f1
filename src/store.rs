//! Template store
//!
//! Build requests start from two layered templates per build type: the
//! outer orchestration document (`<key>.json`) and the inner pipeline
//! document (`<key>_inner.json`). The store trait keeps the renderer
//! independent of where templates live; [`MemoryTemplateStore`] backs
//! tests and embedders.

use crate::descriptor::OuterDescriptor;
use crate::error::{Error, Result};
use crate::pipeline::PipelineDescriptor;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub trait TemplateStore {
    /// Load the outer orchestration template for a build-type key.
    fn load_outer(&self, key: &str) -> Result<OuterDescriptor>;

    /// Load the inner pipeline template for a build-type key.
    fn load_inner(&self, key: &str) -> Result<PipelineDescriptor>;
}

/// Store reading templates from a directory of JSON files.
pub struct FsTemplateStore {
    dir: PathBuf,
}

impl FsTemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read(&self, file_name: &str) -> Result<(PathBuf, String)> {
        let path = self.dir.join(file_name);
        debug!(path = %path.display(), "loading template");
        let text = fs::read_to_string(&path).map_err(|source| Error::TemplateLoad {
            path: path.clone(),
            source,
        })?;
        Ok((path, text))
    }
}

fn parse<T: serde::de::DeserializeOwned>(path: &Path, text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|source| Error::TemplateParse {
        path: path.to_path_buf(),
        source,
    })
}

impl TemplateStore for FsTemplateStore {
    fn load_outer(&self, key: &str) -> Result<OuterDescriptor> {
        let (path, text) = self.read(&format!("{}.json", key))?;
        parse(&path, &text)
    }

    fn load_inner(&self, key: &str) -> Result<PipelineDescriptor> {
        let (path, text) = self.read(&format!("{}_inner.json", key))?;
        parse(&path, &text)
    }
}

/// In-memory store keyed by build type.
#[derive(Default)]
pub struct MemoryTemplateStore {
    outer: HashMap<String, OuterDescriptor>,
    inner: HashMap<String, PipelineDescriptor>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        key: impl Into<String>,
        outer: OuterDescriptor,
        inner: PipelineDescriptor,
    ) {
        let key = key.into();
        self.outer.insert(key.clone(), outer);
        self.inner.insert(key, inner);
    }
}

impl TemplateStore for MemoryTemplateStore {
    fn load_outer(&self, key: &str) -> Result<OuterDescriptor> {
        self.outer.get(key).cloned().ok_or_else(|| Error::TemplateLoad {
            path: PathBuf::from(format!("{}.json", key)),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such template"),
        })
    }

    fn load_inner(&self, key: &str) -> Result<PipelineDescriptor> {
        self.inner.get(key).cloned().ok_or_else(|| Error::TemplateLoad {
            path: PathBuf::from(format!("{}_inner.json", key)),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such template"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_fs_store_loads_both_documents() {
        let dir = tempfile::tempdir().unwrap();
        let outer = json!({
            "metadata": {},
            "spec": {
                "source": {"git": {"uri": "", "ref": "master"}},
                "strategy": {"customStrategy": {"env": []}},
                "output": {"to": {"name": ""}}
            }
        });
        let inner = json!({"prebuild_plugins": [{"name": "koji"}]});

        let mut f = fs::File::create(dir.path().join("prod.json")).unwrap();
        write!(f, "{}", outer).unwrap();
        let mut f = fs::File::create(dir.path().join("prod_inner.json")).unwrap();
        write!(f, "{}", inner).unwrap();

        let store = FsTemplateStore::new(dir.path());
        let outer = store.load_outer("prod").unwrap();
        assert_eq!(outer.spec.source.git.git_ref, "master");
        let inner = store.load_inner("prod").unwrap();
        assert_eq!(inner.prebuild[0].name, "koji");
    }

    #[test]
    fn test_fs_store_missing_template_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsTemplateStore::new(dir.path());
        let err = store.load_outer("nope").unwrap_err();
        assert!(matches!(err, Error::TemplateLoad { .. }));
    }

    #[test]
    fn test_fs_store_malformed_template_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        let store = FsTemplateStore::new(dir.path());
        let err = store.load_outer("bad").unwrap_err();
        assert!(matches!(err, Error::TemplateParse { .. }));
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryTemplateStore::new();
        store.insert(
            "simple",
            OuterDescriptor::default(),
            PipelineDescriptor::default(),
        );
        assert!(store.load_outer("simple").is_ok());
        assert!(matches!(
            store.load_outer("prod").unwrap_err(),
            Error::TemplateLoad { .. }
        ));
    }
}
