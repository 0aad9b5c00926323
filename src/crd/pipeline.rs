//! Pipeline: a one-shot execution of download → scan → extract → upload
//! for a single Target.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, Target};

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ocular.crashoverride.run",
    version = "v1beta1",
    kind = "Pipeline",
    namespaced,
    status = "PipelineStatus",
    shortname = "pl",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Profile","type":"string","jsonPath":".spec.profileName"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSpec {
    pub target: Target,

    /// Name of the Profile (in the same namespace) this Pipeline runs.
    pub profile_name: String,

    /// Maximum lifetime of the execution; after this many seconds from
    /// creation the reconciler deletes the Pipeline and cascades to its
    /// children, regardless of phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds_max_lifetime: Option<i64>,

    /// Shorter TTL applied once the Pipeline reaches a terminal phase
    /// (`Completed`, `Failed`, `Cancelled`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_ttl_seconds: Option<i64>,
}

/// Lifecycle phase of a Pipeline, per the state machine in the Pipeline
/// Engine design.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum PipelinePhase {
    #[default]
    Pending,
    Downloading,
    Scanning,
    Uploading,
    Completed,
    Failed,
    Cancelled,
}

impl PipelinePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelinePhase::Completed | PipelinePhase::Failed | PipelinePhase::Cancelled
        )
    }
}

/// Status of one stage (scan or upload) of the Pipeline.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum StageStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    /// The stage was intentionally skipped (e.g. no uploaders bound).
    NotRan,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatus {
    #[serde(default)]
    pub phase: PipelinePhase,
    #[serde(default)]
    pub scan_status: StageStatus,
    #[serde(default)]
    pub upload_status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl PipelineStatus {
    pub fn with_phase(phase: PipelinePhase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }
}
