//! buildforge - build request renderer for container-image build orchestration
//!
//! This library renders a declarative build request: given a set of typed
//! parameters (source repository, registry, koji/pulp endpoints, secrets,
//! resource limits) it produces a fully populated orchestration descriptor
//! with an embedded plugin-pipeline descriptor, applying conditional policy
//! along the way.
//!
//! # Core Concepts
//!
//! - **Build types**: the `prod` and `simple` variants, each with its own
//!   parameter specification and rendering rules
//! - **Outer descriptor**: the orchestration-level document (metadata,
//!   source, output target, triggers, secret mounts)
//! - **Pipeline descriptor**: the ordered list of plugin stages embedded in
//!   the outer descriptor as the `DOCK_PLUGINS` environment entry
//! - **Templates**: both documents start from per-build-type templates
//!   loaded through a [`store::TemplateStore`]
//!
//! # Example Usage
//!
//! ```no_run
//! use buildforge::{BuildManager, FsTemplateStore};
//! use serde_json::{json, Map, Value};
//! use std::sync::Arc;
//!
//! fn render() -> Result<Value, Box<dyn std::error::Error>> {
//!     let store = Arc::new(FsTemplateStore::new("/usr/share/buildforge"));
//!     let manager = BuildManager::new(store);
//!
//!     let mut request = manager.build_request("simple")?;
//!     let params: Map<String, Value> = serde_json::from_value(json!({
//!         "git_uri": "https://git.example.com/spam.git",
//!         "user": "john-foo",
//!         "component": "spam",
//!         "registry_uri": "registry.example.com",
//!         "orchestrator_url": "https://orchestrator.example.com/",
//!     }))?;
//!     request.set_params(&params)?;
//!
//!     Ok(request.render(true)?)
//! }
//! ```

// Public modules
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod params;
pub mod pipeline;
pub mod request;
pub mod store;
pub mod utils;

// Re-export key types for convenient access
pub use config::BuildforgeConfig;
pub use descriptor::OuterDescriptor;
pub use error::{Error, Result};
pub use params::{ParamKind, ParameterSpec};
pub use pipeline::{PipelineDescriptor, PipelineManipulator, Stage, StageGroup};
pub use request::{BuildManager, BuildRequest, BuildType, DOCK_PLUGINS_ENV, SECRETS_ROOT};
pub use store::{FsTemplateStore, MemoryTemplateStore, TemplateStore};
pub use utils::{PlatformVersion, SECRETS_ARRAY_MIN_VERSION};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name_is_buildforge() {
        assert_eq!(NAME, "buildforge");
    }
}
