//! Typed build parameters
//!
//! A [`ParameterSpec`] is a declared bag of named parameter slots. Callers
//! populate it with one bulk [`set_params`](ParameterSpec::set_params) call;
//! undeclared names are rejected outright. Validation is pure and may run
//! any number of times: it checks required-ness and per-kind shape (a
//! list-of-strings slot rejects a bare scalar rather than wrapping it).
//!
//! The per-variant catalogs mirror the three build types: common parameters
//! shared by every build, plus production and simple supersets with their
//! derived slots (build name, image tag, image-stream coordinates).

use crate::error::{Error, Result};
use crate::utils::{git_repo_humanish_part, imagestream_tag_from_image};
use chrono::Local;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Longest name the orchestrator accepts for a build.
const BUILD_NAME_MAX_LEN: usize = 63;

fn build_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9])?$").unwrap())
}

fn registry_host_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^https?://([^/]*)/?.*$").unwrap())
}

/// Shape of a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Scalar string.
    Text,
    /// Sequence of strings; a bare scalar is a validation error.
    TextList,
    /// Boolean, or absent.
    Flag,
}

impl ParamKind {
    fn check(self, name: &str, value: &Value) -> Result<()> {
        let ok = match self {
            ParamKind::Text => value.is_string(),
            ParamKind::TextList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            ParamKind::Flag => value.is_boolean(),
        };
        if ok {
            Ok(())
        } else {
            Err(Error::validation(format!(
                "param '{}' is not valid: expected {}",
                name,
                match self {
                    ParamKind::Text => "a string",
                    ParamKind::TextList => "a list of strings",
                    ParamKind::Flag => "a boolean",
                }
            )))
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    kind: ParamKind,
    required: bool,
    default: Option<Value>,
    value: Option<Value>,
}

/// Declared, typed bag of build parameters.
#[derive(Debug, Clone)]
pub struct ParameterSpec {
    slots: BTreeMap<&'static str, Slot>,
}

impl ParameterSpec {
    fn empty() -> Self {
        Self {
            slots: BTreeMap::new(),
        }
    }

    fn declare(&mut self, name: &'static str, kind: ParamKind, required: bool) {
        self.slots.insert(
            name,
            Slot {
                kind,
                required,
                default: None,
                value: None,
            },
        );
    }

    fn required_text(&mut self, name: &'static str) {
        self.declare(name, ParamKind::Text, true);
    }

    fn required_text_with_default(&mut self, name: &'static str, default: &str) {
        self.declare(name, ParamKind::Text, true);
        if let Some(slot) = self.slots.get_mut(name) {
            slot.default = Some(Value::String(default.to_string()));
        }
    }

    fn optional_text(&mut self, name: &'static str) {
        self.declare(name, ParamKind::Text, false);
    }

    fn text_list(&mut self, name: &'static str) {
        self.declare(name, ParamKind::TextList, false);
    }

    fn flag(&mut self, name: &'static str) {
        self.declare(name, ParamKind::Flag, false);
    }

    /// Parameters shared by every build type.
    pub fn common() -> Self {
        let mut spec = Self::empty();
        spec.required_text("git_uri");
        spec.required_text_with_default("git_ref", "master");
        spec.required_text("user");
        spec.required_text("component");
        spec.required_text("registry_uri");
        spec.required_text("orchestrator_url");
        spec.optional_text("name");
        spec.text_list("yum_repourls");
        spec.flag("use_auth");
        spec
    }

    /// Production-build parameters: common set plus koji/pulp endpoints,
    /// image labels, secrets, NFS target, push coordinates, and the slots
    /// derived at set time.
    pub fn production() -> Self {
        let mut spec = Self::common();
        spec.required_text("sources_command");
        spec.required_text("architecture");
        spec.required_text("vendor");
        spec.required_text("build_host");
        spec.required_text("authoritative_registry");
        spec.optional_text("git_branch");
        spec.optional_text("base_image");
        spec.optional_text("name_label");
        spec.optional_text("koji_target");
        spec.optional_text("koji_root");
        spec.optional_text("koji_hub");
        spec.optional_text("pulp_secret");
        // deprecated alias for pulp_secret
        spec.optional_text("source_secret");
        spec.optional_text("pulp_registry");
        spec.optional_text("pdc_secret");
        spec.optional_text("nfs_server_path");
        spec.optional_text("nfs_dest_dir");
        spec.optional_text("git_push_url");
        spec.optional_text("git_push_username");
        spec.optional_text("trigger_imagestreamtag");
        spec.optional_text("imagestream_name");
        spec.optional_text("imagestream_url");
        spec.optional_text("image_tag");
        spec
    }

    /// Simple-build parameters: common set plus the derived image tag.
    pub fn simple() -> Self {
        let mut spec = Self::common();
        spec.optional_text("image_tag");
        spec
    }

    /// Bulk-set parameter values.
    ///
    /// Every name must be declared; an unknown name fails the whole call
    /// before anything is stored, so previously set values survive. Null
    /// values are treated as "not supplied". Calling again overwrites.
    pub fn set_params(&mut self, params: &Map<String, Value>) -> Result<()> {
        if let Some(unknown) = params.keys().find(|k| !self.slots.contains_key(k.as_str())) {
            return Err(Error::UnknownParameter(unknown.clone()));
        }

        for (name, value) in params {
            if value.is_null() {
                continue;
            }
            debug!(param = %name, value = %value, "setting parameter");
            if let Some(slot) = self.slots.get_mut(name.as_str()) {
                slot.value = Some(value.clone());
            }
        }

        // Parameter-specific postprocessing: user names are padded to the
        // minimum length image tags require, registry URIs are reduced to
        // host[:port].
        if let Some(user) = self.str_value("user").map(str::to_string) {
            if user.len() < 4 {
                self.set_value("user", Value::String(format!("{:_<4}", user)))?;
            }
        }
        if let Some(registry) = self.str_value("registry_uri").map(str::to_string) {
            let host = registry_host_re()
                .captures(&registry)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or(registry);
            self.set_value("registry_uri", Value::String(host))?;
        }
        // 'source_secret' is accepted as a deprecated alias; the canonical
        // name wins when both are given.
        if self.value("pulp_secret").is_none() {
            if let Some(secret) = self.value("source_secret").cloned() {
                debug!("treating deprecated 'source_secret' as 'pulp_secret'");
                self.set_value("pulp_secret", secret)?;
            }
        }

        Ok(())
    }

    /// Set one declared slot directly. Used for derived values.
    pub(crate) fn set_value(&mut self, name: &str, value: Value) -> Result<()> {
        match self.slots.get_mut(name) {
            Some(slot) => {
                slot.value = Some(value);
                Ok(())
            }
            None => Err(Error::UnknownParameter(name.to_string())),
        }
    }

    /// Validate required-ness and value shape. Pure; call as often as
    /// needed, including after values change.
    pub fn validate(&self) -> Result<()> {
        debug!("validating parameters");
        for (name, slot) in &self.slots {
            match slot.value.as_ref().or(slot.default.as_ref()) {
                None if slot.required => {
                    return Err(Error::validation(format!(
                        "param '{}' is not valid: a value is required",
                        name
                    )));
                }
                None => {}
                Some(value) => {
                    slot.kind.check(name, value)?;
                    if *name == "name" {
                        if let Some(candidate) = value.as_str() {
                            validate_build_name(candidate)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Stored value, falling back to the declared default.
    pub fn value(&self, name: &str) -> Option<&Value> {
        let slot = self.slots.get(name)?;
        slot.value.as_ref().or(slot.default.as_ref())
    }

    pub fn str_value(&self, name: &str) -> Option<&str> {
        self.value(name).and_then(Value::as_str)
    }

    /// Stored string value, or a validation failure naming the field. Used
    /// by render steps that cannot proceed without the parameter.
    pub fn require_str(&self, name: &str) -> Result<&str> {
        self.str_value(name).ok_or_else(|| {
            Error::validation(format!("param '{}' is not valid: a value is required", name))
        })
    }

    pub fn str_list(&self, name: &str) -> Option<Vec<String>> {
        self.value(name)?.as_array().map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
    }

    pub fn bool_value(&self, name: &str) -> Option<bool> {
        self.value(name).and_then(Value::as_bool)
    }

    /// Compute the production-only derived slots from the inputs that are
    /// present. Missing inputs leave their derived slots unset; validation
    /// and render-time checks surface them.
    pub(crate) fn derive_production(&mut self) -> Result<()> {
        let name = match (self.str_value("git_uri"), self.str_value("git_branch")) {
            (Some(git_uri), Some(branch)) => {
                Some(format!("{}-{}", git_repo_humanish_part(git_uri), branch))
            }
            _ => None,
        };
        if let Some(name) = name {
            let name = validate_build_name(&name)?;
            self.set_value("name", Value::String(name))?;
        }

        let trigger_tag = self.str_value("base_image").map(imagestream_tag_from_image);
        if let Some(tag) = trigger_tag {
            self.set_value("trigger_imagestreamtag", Value::String(tag))?;
        }

        if let Some(name_label) = self.str_value("name_label").map(str::to_string) {
            self.set_value(
                "imagestream_name",
                Value::String(name_label.replace('/', "-")),
            )?;
            let url = self
                .str_value("registry_uri")
                .map(|registry| format!("{}/{}", registry, name_label));
            if let Some(url) = url {
                self.set_value("imagestream_url", Value::String(url))?;
            }
        }

        let image_tag = match (self.str_value("user"), self.str_value("component")) {
            (Some(user), Some(component)) => {
                let target = self.str_value("koji_target").unwrap_or("none");
                Some(format!("{}/{}:{}-{}", user, component, target, timestamp()))
            }
            _ => None,
        };
        if let Some(tag) = image_tag {
            self.set_value("image_tag", Value::String(tag))?;
        }

        Ok(())
    }

    /// Compute the simple-build derived slots.
    pub(crate) fn derive_simple(&mut self) -> Result<()> {
        let stamp = timestamp();
        self.set_value("name", Value::String(format!("build-{}", stamp)))?;

        let image_tag = match (self.str_value("user"), self.str_value("component")) {
            (Some(user), Some(component)) => Some(format!("{}/{}:{}", user, component, stamp)),
            _ => None,
        };
        if let Some(tag) = image_tag {
            self.set_value("image_tag", Value::String(tag))?;
        }

        Ok(())
    }
}

fn timestamp() -> String {
    Local::now().format("%Y%m%d%H%M%S").to_string()
}

/// Check a generated or supplied build name against the orchestrator's
/// naming rules, truncating an over-long name rather than failing.
pub fn validate_build_name(name: &str) -> Result<String> {
    let name = if name.len() > BUILD_NAME_MAX_LEN {
        let truncated: String = name.chars().take(BUILD_NAME_MAX_LEN).collect();
        warn!("'{}' is too long, changing to '{}'", name, truncated);
        truncated
    } else {
        name.to_string()
    };

    if !build_name_re().is_match(&name) {
        return Err(Error::validation(format!(
            "build name '{}' doesn't match '{}'",
            name,
            build_name_re().as_str()
        )));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn minimal_common() -> Map<String, Value> {
        params(&[
            ("git_uri", json!("https://git.example.com/spam.git")),
            ("user", json!("john-foo")),
            ("component", json!("component")),
            ("registry_uri", json!("https://registry.example.com/v2")),
            ("orchestrator_url", json!("http://orchestrator.example.com/")),
        ])
    }

    #[test]
    fn test_validate_fails_until_required_set() {
        let spec = ParameterSpec::common();
        let err = spec.validate().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let mut spec = ParameterSpec::common();
        spec.set_params(&minimal_common()).unwrap();
        spec.validate().unwrap();
        // pure: safe to call again
        spec.validate().unwrap();
    }

    #[test]
    fn test_unknown_param_rejected_without_side_effects() {
        let mut spec = ParameterSpec::common();
        spec.set_params(&minimal_common()).unwrap();

        let err = spec
            .set_params(&params(&[
                ("git_uri", json!("https://git.example.com/other.git")),
                ("no_such_param", json!("x")),
            ]))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownParameter(ref name) if name == "no_such_param"));

        // the valid key in the failed call was not applied either
        assert_eq!(
            spec.str_value("git_uri"),
            Some("https://git.example.com/spam.git")
        );
    }

    #[test]
    fn test_yum_repourls_rejects_scalar() {
        let mut spec = ParameterSpec::common();
        spec.set_params(&minimal_common()).unwrap();
        spec.set_params(&params(&[("yum_repourls", json!("http://example.com/repo"))]))
            .unwrap();
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("yum_repourls"));

        spec.set_params(&params(&[(
            "yum_repourls",
            json!(["http://example.com/repo"]),
        )]))
        .unwrap();
        spec.validate().unwrap();
        assert_eq!(
            spec.str_list("yum_repourls").unwrap(),
            vec!["http://example.com/repo".to_string()]
        );
    }

    #[test]
    fn test_use_auth_must_be_boolean() {
        let mut spec = ParameterSpec::common();
        spec.set_params(&minimal_common()).unwrap();
        spec.set_params(&params(&[("use_auth", json!("yes"))])).unwrap();
        assert!(spec.validate().is_err());

        spec.set_params(&params(&[("use_auth", json!(true))])).unwrap();
        spec.validate().unwrap();
        assert_eq!(spec.bool_value("use_auth"), Some(true));
    }

    #[test]
    fn test_git_ref_default() {
        let mut spec = ParameterSpec::common();
        spec.set_params(&minimal_common()).unwrap();
        assert_eq!(spec.str_value("git_ref"), Some("master"));
    }

    #[test]
    fn test_short_user_padded() {
        let mut spec = ParameterSpec::common();
        let mut p = minimal_common();
        p.insert("user".to_string(), json!("me"));
        spec.set_params(&p).unwrap();
        assert_eq!(spec.str_value("user"), Some("me__"));
    }

    #[test]
    fn test_registry_uri_reduced_to_host() {
        let mut spec = ParameterSpec::common();
        spec.set_params(&minimal_common()).unwrap();
        assert_eq!(spec.str_value("registry_uri"), Some("registry.example.com"));

        spec.set_params(&params(&[(
            "registry_uri",
            json!("http://registry.example.com:5000"),
        )]))
        .unwrap();
        assert_eq!(
            spec.str_value("registry_uri"),
            Some("registry.example.com:5000")
        );
    }

    #[test]
    fn test_derive_production() {
        let mut spec = ParameterSpec::production();
        let mut p = minimal_common();
        p.extend(params(&[
            ("git_branch", json!("stable")),
            ("base_image", json!("registry.example.com:5000/buildroot:latest")),
            ("name_label", json!("spam/component")),
            ("koji_target", json!("f24")),
        ]));
        spec.set_params(&p).unwrap();
        spec.derive_production().unwrap();

        assert_eq!(spec.str_value("name"), Some("spam-stable"));
        assert_eq!(
            spec.str_value("trigger_imagestreamtag"),
            Some("buildroot:latest")
        );
        assert_eq!(spec.str_value("imagestream_name"), Some("spam-component"));
        assert_eq!(
            spec.str_value("imagestream_url"),
            Some("registry.example.com/spam/component")
        );
        let image_tag = spec.str_value("image_tag").unwrap();
        assert!(image_tag.starts_with("john-foo/component:f24-"));
    }

    #[test]
    fn test_derive_simple() {
        let mut spec = ParameterSpec::simple();
        spec.set_params(&minimal_common()).unwrap();
        spec.derive_simple().unwrap();

        assert!(spec.str_value("name").unwrap().starts_with("build-"));
        assert!(spec
            .str_value("image_tag")
            .unwrap()
            .starts_with("john-foo/component:"));
    }

    #[test]
    fn test_source_secret_aliases_pulp_secret() {
        let mut spec = ParameterSpec::production();
        let mut p = minimal_common();
        p.insert("source_secret".to_string(), json!("pulpsecret"));
        spec.set_params(&p).unwrap();
        assert_eq!(spec.str_value("pulp_secret"), Some("pulpsecret"));

        // the canonical name takes precedence over the alias
        let mut spec = ParameterSpec::production();
        let mut p = minimal_common();
        p.insert("source_secret".to_string(), json!("legacy"));
        p.insert("pulp_secret".to_string(), json!("canonical"));
        spec.set_params(&p).unwrap();
        assert_eq!(spec.str_value("pulp_secret"), Some("canonical"));
    }

    #[test]
    fn test_build_name_truncated() {
        let long = "a".repeat(80);
        let name = validate_build_name(&long).unwrap();
        assert_eq!(name.len(), BUILD_NAME_MAX_LEN);
    }

    #[test]
    fn test_build_name_rejects_invalid_chars() {
        assert!(validate_build_name("spam/eggs").is_err());
        assert!(validate_build_name("-leading-dash").is_err());
        assert!(validate_build_name("spam-master").is_ok());
    }

    #[test]
    fn test_require_str_names_missing_field() {
        let spec = ParameterSpec::common();
        let err = spec.require_str("git_uri").unwrap_err();
        assert!(err.to_string().contains("git_uri"));
    }
}
