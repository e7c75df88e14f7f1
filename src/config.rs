//! Configuration for buildforge
//!
//! Settings are loaded from environment variables with sensible defaults;
//! CLI flags override whatever the environment provides. Configuration
//! covers where build templates live and the instance-wide values most
//! deployments share across builds.
//!
//! # Environment Variables
//!
//! - `BUILDFORGE_TEMPLATE_DIR`: directory with build templates - default: "/usr/share/buildforge"
//! - `BUILDFORGE_REGISTRY_URI`: registry the built image is pushed to
//! - `BUILDFORGE_ORCHESTRATOR_URL`: URL of the build orchestrator
//! - `BUILDFORGE_REQUIRED_PLATFORM_VERSION`: minimum platform version, e.g. "1.0.6" - default: "0.5.4"
//! - `BUILDFORGE_USE_AUTH`: pass orchestrator auth to reporting stages (true|false)
//! - `BUILDFORGE_LOG_LEVEL`: logging level - default: "info"

use crate::error::{Error, Result};
use crate::utils::PlatformVersion;
use std::env;
use std::fmt;
use std::path::PathBuf;
use tracing::warn;

const DEFAULT_TEMPLATE_DIR: &str = "/usr/share/buildforge";
const DEFAULT_LOG_LEVEL: &str = "info";

/// Instance-wide configuration for rendering build requests.
#[derive(Debug, Clone)]
pub struct BuildforgeConfig {
    /// Directory holding the outer/inner template pairs.
    pub template_dir: PathBuf,

    /// Registry the built image is pushed to.
    pub registry_uri: Option<String>,

    /// URL of the build orchestrator instance.
    pub orchestrator_url: Option<String>,

    /// Minimum platform version; selects compatibility behavior.
    pub required_platform_version: PlatformVersion,

    /// Whether reporting stages authenticate against the orchestrator.
    pub use_auth: Option<bool>,

    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for BuildforgeConfig {
    /// Loads from `BUILDFORGE_*` environment variables, falling back to
    /// defaults for anything unset.
    fn default() -> Self {
        let template_dir = env::var("BUILDFORGE_TEMPLATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_TEMPLATE_DIR));

        let required_platform_version = env::var("BUILDFORGE_REQUIRED_PLATFORM_VERSION")
            .map(|raw| parse_version_or_default(&raw))
            .unwrap_or_default();

        let use_auth = env::var("BUILDFORGE_USE_AUTH")
            .ok()
            .and_then(|v| v.parse::<bool>().ok());

        let log_level = env::var("BUILDFORGE_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        Self {
            template_dir,
            registry_uri: env::var("BUILDFORGE_REGISTRY_URI").ok(),
            orchestrator_url: env::var("BUILDFORGE_ORCHESTRATOR_URL").ok(),
            required_platform_version,
            use_auth,
            log_level,
        }
    }
}

/// Parse the version override, logging a warning and keeping the default
/// when the value is malformed.
fn parse_version_or_default(raw: &str) -> PlatformVersion {
    match raw.parse() {
        Ok(version) => version,
        Err(err) => {
            warn!(
                "ignoring BUILDFORGE_REQUIRED_PLATFORM_VERSION '{}': {}",
                raw, err
            );
            PlatformVersion::default()
        }
    }
}

impl BuildforgeConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.template_dir.as_os_str().is_empty() {
            return Err(Error::validation("template directory must not be empty"));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(Error::validation(format!(
                    "invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    other
                )))
            }
        }

        Ok(())
    }
}

impl fmt::Display for BuildforgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Buildforge Configuration:")?;
        writeln!(f, "  Template Dir: {}", self.template_dir.display())?;
        if let Some(ref registry) = self.registry_uri {
            writeln!(f, "  Registry: {}", registry)?;
        }
        if let Some(ref url) = self.orchestrator_url {
            writeln!(f, "  Orchestrator: {}", url)?;
        }
        writeln!(
            f,
            "  Required Platform Version: {}",
            self.required_platform_version
        )?;
        if let Some(use_auth) = self.use_auth {
            writeln!(f, "  Use Auth: {}", use_auth)?;
        }
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual_config() -> BuildforgeConfig {
        BuildforgeConfig {
            template_dir: PathBuf::from("/usr/share/buildforge"),
            registry_uri: Some("registry.example.com".to_string()),
            orchestrator_url: Some("http://orchestrator.example.com/".to_string()),
            required_platform_version: PlatformVersion::new(1, 0, 6),
            use_auth: Some(true),
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn test_validation_valid() {
        assert!(manual_config().validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_log_level() {
        let mut config = manual_config();
        config.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_empty_template_dir() {
        let mut config = manual_config();
        config.template_dir = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_version_falls_back_to_default() {
        assert_eq!(
            parse_version_or_default("1.0,6"),
            PlatformVersion::default()
        );
        assert_eq!(
            parse_version_or_default("1.0.6"),
            PlatformVersion::new(1, 0, 6)
        );
    }

    #[test]
    fn test_config_display() {
        let display = manual_config().to_string();
        assert!(display.contains("Buildforge Configuration:"));
        assert!(display.contains("Required Platform Version: 1.0.6"));
    }
}
