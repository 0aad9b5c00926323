//! Shared value types referenced by every Ocular custom resource.
//!
//! These are the building blocks described in the data model: the
//! `UserContainer`/`UserContainerWithParameters` shapes that `Downloader`,
//! `Scanner`, `Uploader` and `Crawler` specialize, the `SecretRef` mount
//! model, and the `Target`/`Condition` records used across the Pipeline and
//! Search engines.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kubernetes-style readiness condition, following the same shape the
/// reconcilers use for `PipelineStatus`/`SearchStatus`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    pub last_transition_time: String,
    pub reason: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    pub fn new(type_: &str, status: bool, reason: &str, message: impl Into<String>) -> Self {
        Self {
            type_: type_.to_string(),
            status: if status { "True" } else { "False" }.to_string(),
            last_transition_time: chrono::Utc::now().to_rfc3339(),
            reason: reason.to_string(),
            message: message.into(),
            observed_generation: None,
        }
    }
}

/// How a `SecretRef` is exposed to the container it is mounted on.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SecretMount {
    /// Expose the secret key as the named environment variable.
    EnvVar { name: String },
    /// Expose the secret key as a file at the given absolute path.
    File { path: String },
}

/// A reference to a single key within a cluster Secret, plus how it should
/// be mounted onto a `UserContainer`.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    /// Name of the Secret object in the execution's namespace.
    pub secret_name: String,
    /// Key within the Secret's data.
    pub key: String,
    pub mount: SecretMount,
    #[serde(default)]
    pub required: bool,
}

/// A single environment variable on a `UserContainer`.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// A reusable container spec: image, pull policy, optional command/args,
/// ordered environment variables and secret mounts. `Downloader` and
/// `Scanner` use this shape directly; `UserContainerWithParameters` wraps it
/// for `Uploader` and `Crawler`.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserContainer {
    pub image: String,
    #[serde(default)]
    pub pull_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub env: Vec<EnvVar>,
    #[serde(default)]
    pub secrets: Vec<SecretRef>,
}

/// A single parameter declaration within a `ParameterSchema`.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDefinition {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// A `UserContainer` plus a named parameter schema. `Uploader` and
/// `Crawler` use this shape.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserContainerWithParameters {
    #[serde(flatten)]
    pub container: UserContainer,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterDefinition>,
}

/// `{downloader, identifier, version}` triple identifying one unit of work
/// for a Pipeline.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    /// Name of the Downloader (or ClusterDownloader) to resolve.
    pub downloader: String,
    /// Opaque identifier passed to the downloader, e.g. a repository URL.
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// A binding of a named Uploader plus the parameter values supplied for it,
/// as embedded in a Profile's uploader list.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploaderBinding {
    /// Name of the Uploader (or ClusterUploader) to resolve.
    pub name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// A reference to a named, parameterized object. Used for a Search's
/// Crawler reference and for records written to the scheduler sidecar's
/// search-fifo.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParameterizedObjectReference {
    pub name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// Format a parameter name the way the Pipeline Engine formats env vars:
/// `ToUpperSnake(replace('-','_') ∘ strip-non-[A-Za-z0-9_])`, prefixed with
/// `OCULAR_PARAM_`.
pub fn param_env_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '-' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    format!("OCULAR_PARAM_{}", cleaned.to_uppercase())
}

/// Validate a name used as a parameter key: non-empty, at most 63
/// characters, and restricted to `[A-Za-z0-9_-]`.
pub fn is_valid_param_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_env_name_formats_kebab_case() {
        assert_eq!(param_env_name("api-token"), "OCULAR_PARAM_API_TOKEN");
    }

    #[test]
    fn param_env_name_strips_disallowed_characters() {
        assert_eq!(param_env_name("a.b c"), "OCULAR_PARAM_ABC");
    }

    #[test]
    fn param_name_validation() {
        assert!(is_valid_param_name("token"));
        assert!(is_valid_param_name("api-token_2"));
        assert!(!is_valid_param_name(""));
        assert!(!is_valid_param_name("has space"));
        assert!(!is_valid_param_name(&"a".repeat(64)));
    }
}
