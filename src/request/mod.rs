//! Build request rendering
//!
//! A [`BuildRequest`] wraps the logic for creating build inputs: it owns a
//! [`ParameterSpec`] for its build type, loads the outer and inner templates
//! from a [`TemplateStore`], applies the rendering rules, and serializes the
//! mutated pipeline back into the outer descriptor as the `DOCK_PLUGINS`
//! strategy environment entry.
//!
//! Lifecycle per instance: set parameters (re-entrant), then render once.
//! Rendering is not guaranteed idempotent (some mutations, like the
//! release-bump git-ref rewrite, are one-way), so a fresh instance is
//! created per desired build.

mod production;
mod simple;

use crate::descriptor::OuterDescriptor;
use crate::error::{Error, Result};
use crate::params::ParameterSpec;
use crate::pipeline::{PipelineManipulator, StageGroup};
use crate::store::TemplateStore;
use crate::utils::{PlatformVersion, SECRETS_ARRAY_MIN_VERSION};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Mount root for secrets injected via the secrets array.
pub const SECRETS_ROOT: &str = "/var/run/secrets";

/// Environment entry carrying the embedded pipeline document.
pub const DOCK_PLUGINS_ENV: &str = "DOCK_PLUGINS";

// Stage names as the pipeline templates declare them.
pub(crate) const STAGE_ADD_YUM_REPO: &str = "add_yum_repo_by_url";
pub(crate) const STAGE_CHECK_AND_SET_REBUILD: &str = "check_and_set_rebuild";
pub(crate) const STAGE_STORE_METADATA: &str = "store_metadata_in_osv3";
pub(crate) const STAGE_FETCH_SOURCES: &str = "distgit_fetch_artefacts";
pub(crate) const STAGE_PULL_BASE_IMAGE: &str = "pull_base_image";
pub(crate) const STAGE_ADD_LABELS: &str = "add_labels_in_dockerfile";
pub(crate) const STAGE_KOJI: &str = "koji";
pub(crate) const STAGE_BUMP_RELEASE: &str = "bump_release";
pub(crate) const STAGE_IMPORT_IMAGE: &str = "import_image";
pub(crate) const STAGE_PULP_PUSH: &str = "pulp_push";
pub(crate) const STAGE_SENDMAIL: &str = "sendmail";
pub(crate) const STAGE_NFS_COPY: &str = "cp_built_image_to_nfs";

/// Where the metadata-reporting stage may live, in preference order. Older
/// pipeline templates declared it as a post-build stage; newer ones as an
/// exit stage.
const REPORT_STAGE_CANDIDATES: [StageGroup; 2] = [StageGroup::Exit, StageGroup::PostBuild];

/// The build-type variants the renderer knows how to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildType {
    Production,
    Simple,
}

impl BuildType {
    /// Canonical template-store key for this build type.
    pub fn key(self) -> &'static str {
        match self {
            BuildType::Production => "prod",
            BuildType::Simple => "simple",
        }
    }

    /// Look up a build type by key, mapping deprecated keys to their
    /// canonical replacements.
    pub fn from_key(key: &str) -> Result<Self> {
        match key {
            "prod" | "prod-without-koji" | "prod-with-secret" => Ok(BuildType::Production),
            "simple" => Ok(BuildType::Simple),
            other => Err(Error::UnknownBuildType(other.to_string())),
        }
    }
}

/// Hands out [`BuildRequest`] instances bound to one template store.
pub struct BuildManager {
    store: Arc<dyn TemplateStore>,
}

impl BuildManager {
    pub fn new(store: Arc<dyn TemplateStore>) -> Self {
        Self { store }
    }

    /// Construct the build request variant for the given build-type key.
    pub fn build_request(&self, build_type_key: &str) -> Result<BuildRequest> {
        let build_type = BuildType::from_key(build_type_key)?;
        debug!(?build_type, key = build_type_key, "instantiating build request");
        Ok(BuildRequest::new(build_type, Arc::clone(&self.store)))
    }
}

/// One renderable build request.
pub struct BuildRequest {
    build_type: BuildType,
    store: Arc<dyn TemplateStore>,
    spec: ParameterSpec,
    template: Option<OuterDescriptor>,
    resource_limits: Option<Map<String, Value>>,
    required_version: PlatformVersion,
    build_json: Option<Value>,
}

impl fmt::Debug for BuildRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildRequest")
            .field("build_type", &self.build_type)
            .field("spec", &self.spec)
            .field("template", &self.template)
            .field("resource_limits", &self.resource_limits)
            .field("required_version", &self.required_version)
            .field("build_json", &self.build_json)
            .finish_non_exhaustive()
    }
}

impl BuildRequest {
    pub fn new(build_type: BuildType, store: Arc<dyn TemplateStore>) -> Self {
        let spec = match build_type {
            BuildType::Production => ParameterSpec::production(),
            BuildType::Simple => ParameterSpec::simple(),
        };
        Self {
            build_type,
            store,
            spec,
            template: None,
            resource_limits: None,
            required_version: PlatformVersion::default(),
            build_json: None,
        }
    }

    pub fn build_type(&self) -> BuildType {
        self.build_type
    }

    /// Set parameters according to this build type's specification and
    /// compute the slots derived from them. May be called again to
    /// overwrite.
    pub fn set_params(&mut self, params: &Map<String, Value>) -> Result<()> {
        debug!(build_type = ?self.build_type, "setting params");
        self.spec.set_params(params)?;
        match self.build_type {
            BuildType::Production => self.spec.derive_production(),
            BuildType::Simple => self.spec.derive_simple(),
        }
    }

    /// Overlay resource limits onto whatever the template declares.
    pub fn set_resource_limits(
        &mut self,
        cpu: Option<&str>,
        memory: Option<&str>,
        storage: Option<&str>,
    ) {
        let limits = self.resource_limits.get_or_insert_with(Map::new);
        if let Some(cpu) = cpu {
            limits.insert("cpu".to_string(), Value::String(cpu.to_string()));
        }
        if let Some(memory) = memory {
            limits.insert("memory".to_string(), Value::String(memory.to_string()));
        }
        if let Some(storage) = storage {
            limits.insert("storage".to_string(), Value::String(storage.to_string()));
        }
    }

    /// Declare the target-platform version compatibility behavior is
    /// selected against.
    pub fn set_required_platform_version(&mut self, version: PlatformVersion) {
        self.required_version = version;
    }

    /// Validate the parameter spec without rendering.
    pub fn validate_input(&self) -> Result<()> {
        self.spec.validate()
    }

    /// True iff the loaded outer template declares an image-change trigger
    /// bound to an image-stream-tag, i.e. the orchestrator will instantiate
    /// builds automatically.
    pub fn is_auto_triggered(&mut self) -> Result<bool> {
        Ok(self.outer_template()?.is_auto_triggered())
    }

    /// Name of the rendered build, once [`render`](Self::render) has run.
    pub fn build_id(&self) -> Option<&str> {
        self.build_json
            .as_ref()?
            .pointer("/metadata/name")?
            .as_str()
    }

    /// The rendered document, once [`render`](Self::render) has run.
    pub fn build_json(&self) -> Option<&Value> {
        self.build_json.as_ref()
    }

    fn outer_template(&mut self) -> Result<&OuterDescriptor> {
        match &mut self.template {
            Some(template) => Ok(template),
            slot => {
                let loaded = self.store.load_outer(self.build_type.key())?;
                Ok(slot.insert(loaded))
            }
        }
    }

    /// Render the input parameters into the templates and return the build
    /// document.
    pub fn render(&mut self, validate: bool) -> Result<Value> {
        if validate {
            self.spec.validate()?;
        }

        let key = self.build_type.key();
        let mut template = match self.template.take() {
            Some(template) => template,
            None => self.store.load_outer(key)?,
        };
        let mut dj = PipelineManipulator::new(self.store.load_inner(key)?);

        self.render_common(&mut template, &mut dj)?;
        match self.build_type {
            BuildType::Production => self.render_production(&mut template, &mut dj)?,
            BuildType::Simple => self.render_simple(&mut dj)?,
        }

        template.set_strategy_env(DOCK_PLUGINS_ENV, dj.serialize()?);

        let rendered = serde_json::to_value(&template)?;
        self.build_json = Some(rendered.clone());
        Ok(rendered)
    }

    /// Rendering steps shared by all build types.
    fn render_common(
        &self,
        template: &mut OuterDescriptor,
        dj: &mut PipelineManipulator,
    ) -> Result<()> {
        // The orchestrator rejects over-long names, so the value has been
        // validated at derivation time.
        template.metadata.name = Some(self.spec.require_str("name")?.to_string());

        if let Some(limits) = &self.resource_limits {
            template.merge_resource_limits(limits);
        }

        template.spec.source.git.uri = self.spec.require_str("git_uri")?.to_string();
        template.spec.source.git.git_ref = self.spec.require_str("git_ref")?.to_string();

        let tag_with_registry = format!(
            "{}/{}",
            self.spec.require_str("registry_uri")?,
            self.spec.require_str("image_tag")?
        );
        template.spec.output.to.name = tag_with_registry;

        if template.image_change_trigger_mut().is_some() {
            let stream_tag = self.spec.require_str("trigger_imagestreamtag")?.to_string();
            if let Some(trigger) = template.image_change_trigger_mut() {
                trigger.from.name = stream_tag;
            }
        }

        if let Some(repourls) = self.spec.str_list("yum_repourls") {
            if dj.has_stage(StageGroup::PreBuild, STAGE_ADD_YUM_REPO) {
                dj.set_arg(StageGroup::PreBuild, STAGE_ADD_YUM_REPO, "repourls", repourls)?;
            }
        }

        if dj.has_stage(StageGroup::PreBuild, STAGE_CHECK_AND_SET_REBUILD) {
            dj.set_arg(
                StageGroup::PreBuild,
                STAGE_CHECK_AND_SET_REBUILD,
                "url",
                self.spec.require_str("orchestrator_url")?,
            )?;
            if let Some(use_auth) = self.spec.bool_value("use_auth") {
                dj.set_arg(
                    StageGroup::PreBuild,
                    STAGE_CHECK_AND_SET_REBUILD,
                    "use_auth",
                    use_auth,
                )?;
            }
        }

        if let Some(use_auth) = self.spec.bool_value("use_auth") {
            set_report_arg(dj, "use_auth", use_auth)?;
        }

        // From platform 1.0.6 secrets are mounted via the 'secrets' array;
        // earlier versions only understand the single 'sourceSecret'
        // reference. Whichever scheme the version rules out is dropped.
        if self.required_version < SECRETS_ARRAY_MIN_VERSION {
            template.spec.strategy.custom_strategy.secrets = None;
        } else {
            template.spec.source.source_secret = None;
        }

        Ok(())
    }

    pub(crate) fn spec(&self) -> &ParameterSpec {
        &self.spec
    }
}

/// Set an argument on the metadata-reporting stage, trying the candidate
/// locations in preference order. Fails with the preferred location's
/// stage-not-found error when no candidate declares the stage.
pub(crate) fn set_report_arg(
    dj: &mut PipelineManipulator,
    key: &str,
    value: impl Into<Value>,
) -> Result<()> {
    for group in REPORT_STAGE_CANDIDATES {
        if dj.has_stage(group, STAGE_STORE_METADATA) {
            return dj.set_arg(group, STAGE_STORE_METADATA, key, value);
        }
    }
    Err(Error::StageNotFound {
        group: REPORT_STAGE_CANDIDATES[0],
        name: STAGE_STORE_METADATA.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineDescriptor;
    use serde_json::json;

    #[test]
    fn test_build_type_from_key() {
        assert_eq!(BuildType::from_key("prod").unwrap(), BuildType::Production);
        assert_eq!(BuildType::from_key("simple").unwrap(), BuildType::Simple);
    }

    #[test]
    fn test_deprecated_keys_alias_to_prod() {
        for key in ["prod-without-koji", "prod-with-secret"] {
            assert_eq!(BuildType::from_key(key).unwrap(), BuildType::Production);
        }
    }

    #[test]
    fn test_unknown_build_type_is_typed_error() {
        let err = BuildType::from_key("spam").unwrap_err();
        assert!(matches!(err, Error::UnknownBuildType(ref key) if key == "spam"));
    }

    #[test]
    fn test_set_report_arg_prefers_exit_stage() {
        let pipeline: PipelineDescriptor = serde_json::from_value(json!({
            "postbuild_plugins": [{"name": STAGE_STORE_METADATA}],
            "exit_plugins": [{"name": STAGE_STORE_METADATA}]
        }))
        .unwrap();
        let mut dj = PipelineManipulator::new(pipeline);
        set_report_arg(&mut dj, "url", "http://orchestrator.example.com/").unwrap();

        let exit_args = dj.stage_args(StageGroup::Exit, STAGE_STORE_METADATA).unwrap();
        assert_eq!(exit_args["url"], json!("http://orchestrator.example.com/"));
        let post_args = dj
            .stage_args(StageGroup::PostBuild, STAGE_STORE_METADATA)
            .unwrap();
        assert!(post_args.is_empty());
    }

    #[test]
    fn test_set_report_arg_falls_back_to_postbuild() {
        let pipeline: PipelineDescriptor = serde_json::from_value(json!({
            "postbuild_plugins": [{"name": STAGE_STORE_METADATA}]
        }))
        .unwrap();
        let mut dj = PipelineManipulator::new(pipeline);
        set_report_arg(&mut dj, "use_auth", true).unwrap();
        let args = dj
            .stage_args(StageGroup::PostBuild, STAGE_STORE_METADATA)
            .unwrap();
        assert_eq!(args["use_auth"], json!(true));
    }

    #[test]
    fn test_set_report_arg_errors_when_absent_everywhere() {
        let mut dj = PipelineManipulator::new(PipelineDescriptor::default());
        let err = set_report_arg(&mut dj, "use_auth", true).unwrap_err();
        assert!(matches!(err, Error::StageNotFound { .. }));
    }
}
