//! Plugin pipeline descriptor and its mutation API
//!
//! The inner document of a build request is an ordered, categorized list of
//! pipeline stages. Each stage has a name (unique within its group) and an
//! open-ended argument mapping whose keys are plugin-defined, so arguments
//! stay a dynamic JSON map while the surrounding structure is typed.
//!
//! [`PipelineManipulator`] is the only way render rules touch the pipeline:
//! stages are addressed by (group, name) rather than position, which keeps
//! the rules stable across template revisions that reorder stages.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

/// Stage categories, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageGroup {
    PreBuild,
    PrePublish,
    PostBuild,
    Exit,
}

impl StageGroup {
    /// Key under which the group appears in the serialized pipeline.
    pub fn wire_name(self) -> &'static str {
        match self {
            StageGroup::PreBuild => "prebuild_plugins",
            StageGroup::PrePublish => "prepublish_plugins",
            StageGroup::PostBuild => "postbuild_plugins",
            StageGroup::Exit => "exit_plugins",
        }
    }
}

impl fmt::Display for StageGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// One pipeline stage: a plugin name plus its argument mapping.
///
/// Unknown stage fields (e.g. `can_fail`) are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub args: Map<String, Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Stage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Map::new(),
            extra: Map::new(),
        }
    }
}

/// The inner pipeline document: four ordered stage lists.
///
/// Empty groups are omitted on the wire; deserializing the serialized form
/// reproduces an equal descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineDescriptor {
    #[serde(
        rename = "prebuild_plugins",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub prebuild: Vec<Stage>,

    #[serde(
        rename = "prepublish_plugins",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub prepublish: Vec<Stage>,

    #[serde(
        rename = "postbuild_plugins",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub postbuild: Vec<Stage>,

    #[serde(
        rename = "exit_plugins",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub exit: Vec<Stage>,
}

impl PipelineDescriptor {
    fn group(&self, group: StageGroup) -> &Vec<Stage> {
        match group {
            StageGroup::PreBuild => &self.prebuild,
            StageGroup::PrePublish => &self.prepublish,
            StageGroup::PostBuild => &self.postbuild,
            StageGroup::Exit => &self.exit,
        }
    }

    fn group_mut(&mut self, group: StageGroup) -> &mut Vec<Stage> {
        match group {
            StageGroup::PreBuild => &mut self.prebuild,
            StageGroup::PrePublish => &mut self.prepublish,
            StageGroup::PostBuild => &mut self.postbuild,
            StageGroup::Exit => &mut self.exit,
        }
    }
}

/// Mutation API over a [`PipelineDescriptor`].
#[derive(Debug, Clone)]
pub struct PipelineManipulator {
    pipeline: PipelineDescriptor,
}

impl PipelineManipulator {
    pub fn new(pipeline: PipelineDescriptor) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &PipelineDescriptor {
        &self.pipeline
    }

    pub fn has_stage(&self, group: StageGroup, name: &str) -> bool {
        self.pipeline.group(group).iter().any(|s| s.name == name)
    }

    fn stage(&self, group: StageGroup, name: &str) -> Result<&Stage> {
        self.pipeline
            .group(group)
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::StageNotFound {
                group,
                name: name.to_string(),
            })
    }

    fn stage_mut(&mut self, group: StageGroup, name: &str) -> Result<&mut Stage> {
        self.pipeline
            .group_mut(group)
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::StageNotFound {
                group,
                name: name.to_string(),
            })
    }

    /// Argument mapping of the named stage.
    pub fn stage_args(&self, group: StageGroup, name: &str) -> Result<&Map<String, Value>> {
        self.stage(group, name).map(|s| &s.args)
    }

    /// Set `args[key] = value` on the named stage.
    pub fn set_arg(
        &mut self,
        group: StageGroup,
        name: &str,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        let value = value.into();
        debug!(%group, stage = name, key, "setting stage argument");
        let stage = self.stage_mut(group, name)?;
        stage.args.insert(key.to_string(), value);
        Ok(())
    }

    /// Merge `partial` into `args[key]`.
    ///
    /// When the existing value is a mapping the merge is shallow: keys from
    /// `partial` overwrite or extend, others are preserved. Any other
    /// existing value (or none) is replaced outright.
    pub fn merge_arg(
        &mut self,
        group: StageGroup,
        name: &str,
        key: &str,
        partial: Map<String, Value>,
    ) -> Result<()> {
        let stage = self.stage_mut(group, name)?;
        match stage.args.get_mut(key) {
            Some(Value::Object(existing)) => {
                for (k, v) in partial {
                    existing.insert(k, v);
                }
            }
            _ => {
                stage.args.insert(key.to_string(), Value::Object(partial));
            }
        }
        Ok(())
    }

    /// Remove the named stage. Removing an absent stage is not an error.
    pub fn remove_stage(&mut self, group: StageGroup, name: &str) {
        let stages = self.pipeline.group_mut(group);
        let before = stages.len();
        stages.retain(|s| s.name != name);
        if stages.len() != before {
            debug!(%group, stage = name, "removed stage");
        }
    }

    /// Render the pipeline as one JSON string, ready to be embedded as a
    /// single string-valued field in the outer descriptor.
    pub fn serialize(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.pipeline)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_pipeline() -> PipelineDescriptor {
        serde_json::from_value(json!({
            "prebuild_plugins": [
                {"name": "koji", "args": {"target": "f24"}},
                {"name": "add_yum_repo_by_url"}
            ],
            "postbuild_plugins": [
                {"name": "pulp_push", "args": {"username": "admin"}, "can_fail": false}
            ],
            "exit_plugins": [
                {"name": "store_metadata_in_osv3", "args": {"url": "http://localhost:8443/"}}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_has_stage() {
        let dj = PipelineManipulator::new(sample_pipeline());
        assert!(dj.has_stage(StageGroup::PreBuild, "koji"));
        assert!(dj.has_stage(StageGroup::PostBuild, "pulp_push"));
        assert!(!dj.has_stage(StageGroup::PreBuild, "pulp_push"));
        assert!(!dj.has_stage(StageGroup::Exit, "missing"));
    }

    #[test]
    fn test_stage_args_missing_stage() {
        let dj = PipelineManipulator::new(sample_pipeline());
        let err = dj.stage_args(StageGroup::PreBuild, "nope").unwrap_err();
        assert!(matches!(err, Error::StageNotFound { .. }));
        assert!(err.to_string().contains("prebuild_plugins"));
    }

    #[test]
    fn test_set_arg_creates_args() {
        let mut dj = PipelineManipulator::new(sample_pipeline());
        dj.set_arg(
            StageGroup::PreBuild,
            "add_yum_repo_by_url",
            "repourls",
            vec!["http://example.com/repo".to_string()],
        )
        .unwrap();
        let args = dj
            .stage_args(StageGroup::PreBuild, "add_yum_repo_by_url")
            .unwrap();
        assert_eq!(args["repourls"], json!(["http://example.com/repo"]));
    }

    #[test]
    fn test_set_arg_missing_stage() {
        let mut dj = PipelineManipulator::new(sample_pipeline());
        let err = dj
            .set_arg(StageGroup::Exit, "missing", "key", "value")
            .unwrap_err();
        assert!(matches!(
            err,
            Error::StageNotFound {
                group: StageGroup::Exit,
                ..
            }
        ));
    }

    #[test]
    fn test_merge_arg_preserves_existing_keys() {
        let mut dj = PipelineManipulator::new(sample_pipeline());
        dj.set_arg(
            StageGroup::PreBuild,
            "koji",
            "labels",
            json!({"Vendor": "preset", "Release": "1"}),
        )
        .unwrap();

        let mut partial = Map::new();
        partial.insert("Vendor".to_string(), json!("overridden"));
        partial.insert("Build_Host".to_string(), json!("builder01"));
        dj.merge_arg(StageGroup::PreBuild, "koji", "labels", partial)
            .unwrap();

        let args = dj.stage_args(StageGroup::PreBuild, "koji").unwrap();
        assert_eq!(
            args["labels"],
            json!({"Vendor": "overridden", "Release": "1", "Build_Host": "builder01"})
        );
    }

    #[test]
    fn test_merge_arg_sets_when_absent() {
        let mut dj = PipelineManipulator::new(sample_pipeline());
        let mut partial = Map::new();
        partial.insert("Vendor".to_string(), json!("acme"));
        dj.merge_arg(StageGroup::PreBuild, "koji", "labels", partial)
            .unwrap();
        let args = dj.stage_args(StageGroup::PreBuild, "koji").unwrap();
        assert_eq!(args["labels"], json!({"Vendor": "acme"}));
    }

    #[test]
    fn test_remove_stage() {
        let mut dj = PipelineManipulator::new(sample_pipeline());
        dj.remove_stage(StageGroup::PreBuild, "koji");
        assert!(!dj.has_stage(StageGroup::PreBuild, "koji"));
        // removing again is a no-op
        dj.remove_stage(StageGroup::PreBuild, "koji");
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut dj = PipelineManipulator::new(sample_pipeline());
        dj.set_arg(StageGroup::PreBuild, "koji", "hub", "http://koji.example.com/hub")
            .unwrap();
        let serialized = dj.serialize().unwrap();
        let restored: PipelineDescriptor = serde_json::from_str(&serialized).unwrap();
        assert_eq!(&restored, dj.pipeline());
    }

    #[test]
    fn test_extra_stage_fields_survive() {
        let dj = PipelineManipulator::new(sample_pipeline());
        let serialized = dj.serialize().unwrap();
        let value: Value = serde_json::from_str(&serialized).unwrap();
        assert_eq!(value["postbuild_plugins"][0]["can_fail"], json!(false));
    }
}
