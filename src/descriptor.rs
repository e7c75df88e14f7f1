//! Outer orchestration descriptor
//!
//! The outer document of a build request: metadata, source location, output
//! target, resource limits, triggers, and the secret-mount substructures.
//! The fixed paths the render rules touch are typed; everything a template
//! author adds beyond them is carried through `flatten`ed passthrough maps
//! so templates round-trip without loss.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OuterDescriptor {
    #[serde(default)]
    pub metadata: Metadata,

    #[serde(default)]
    pub spec: BuildSpec,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildSpec {
    #[serde(default)]
    pub source: SourceSpec,

    #[serde(default)]
    pub output: OutputSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggers: Option<Vec<Trigger>>,

    #[serde(default)]
    pub strategy: StrategySpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    #[serde(default)]
    pub git: GitSource,

    #[serde(
        rename = "sourceSecret",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_secret: Option<SecretRef>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GitSource {
    #[serde(default)]
    pub uri: String,

    #[serde(rename = "ref", default)]
    pub git_ref: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    #[serde(default)]
    pub to: TargetRef,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetRef {
    #[serde(default)]
    pub name: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(rename = "type", default)]
    pub trigger_type: String,

    #[serde(
        rename = "imageChange",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub image_change: Option<ImageChangeTrigger>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageChangeTrigger {
    #[serde(default)]
    pub from: ImageRef,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    #[serde(default)]
    pub kind: String,

    #[serde(default)]
    pub name: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategySpec {
    #[serde(rename = "customStrategy", default)]
    pub custom_strategy: CustomStrategy,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomStrategy {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<Vec<SecretMount>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretMount {
    #[serde(rename = "secretSource")]
    pub secret_source: SecretRef,

    #[serde(rename = "mountPath")]
    pub mount_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretRef {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<Map<String, Value>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OuterDescriptor {
    /// Set the environment entry `name` on the custom strategy, replacing an
    /// existing entry of the same name or appending a new one.
    pub fn set_strategy_env(&mut self, name: &str, value: String) {
        let env = &mut self.spec.strategy.custom_strategy.env;
        if let Some(entry) = env.iter_mut().find(|e| e.name == name) {
            entry.value = value;
        } else {
            env.push(EnvVar {
                name: name.to_string(),
                value,
            });
        }
    }

    /// Merge limit entries into `spec.resources.limits`, leaving limits the
    /// overlay does not mention untouched.
    pub fn merge_resource_limits(&mut self, overlay: &Map<String, Value>) {
        let resources = self.spec.resources.get_or_insert_with(Resources::default);
        let limits = resources.limits.get_or_insert_with(Map::new);
        for (key, value) in overlay {
            limits.insert(key.clone(), value.clone());
        }
    }

    /// Number of declared triggers.
    pub fn trigger_count(&self) -> usize {
        self.spec.triggers.as_ref().map_or(0, Vec::len)
    }

    /// First image-change trigger, if the template declares one.
    pub fn image_change_trigger_mut(&mut self) -> Option<&mut ImageChangeTrigger> {
        self.spec
            .triggers
            .as_mut()?
            .iter_mut()
            .find(|t| t.trigger_type == "ImageChange")
            .and_then(|t| t.image_change.as_mut())
    }

    /// True iff an image-change trigger bound to an image-stream-tag is
    /// present, meaning the orchestrator will instantiate builds on its own.
    pub fn is_auto_triggered(&self) -> bool {
        self.spec
            .triggers
            .iter()
            .flatten()
            .any(|t| {
                t.trigger_type == "ImageChange"
                    && t.image_change
                        .as_ref()
                        .is_some_and(|ic| ic.from.kind == "ImageStreamTag")
            })
    }
}
