//! Error types for build request rendering
//!
//! A single crate-level error enum keeps the taxonomy small: parameter and
//! render-time validation, stage lookup, build-type selection, and template
//! loading each get their own variant so callers can match on what failed.

use crate::pipeline::StageGroup;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A required parameter is missing, a field failed its validator, or a
    /// render-time precondition does not hold.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Caller supplied a parameter name the spec does not declare.
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    /// The requested stage is not present in the loaded pipeline.
    #[error("no stage '{name}' among {group} stages")]
    StageNotFound { group: StageGroup, name: String },

    /// The build-type key is not registered.
    #[error("unknown build type '{0}'")]
    UnknownBuildType(String),

    /// A template could not be read from the store.
    #[error("can't open template '{path}': {source}")]
    TemplateLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A template was read but is not valid JSON for its schema.
    #[error("can't parse template '{path}': {source}")]
    TemplateParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Serializing the rendered document or the embedded pipeline failed.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
