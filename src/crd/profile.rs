//! Profile: the named bundle of scanners, artifact paths and uploader
//! bindings a Pipeline runs against a Target.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{UploaderBinding, UserContainer};

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ocular.crashoverride.run",
    version = "v1beta1",
    kind = "Profile",
    namespaced,
    shortname = "prof",
    printcolumn = r#"{"name":"Scanners","type":"integer","jsonPath":".spec.scanners.length"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSpec {
    /// Scanners are embedded container specs, run in parallel as the scan
    /// workload's main containers; they are not looked up in a registry.
    #[serde(default)]
    pub scanners: Vec<UserContainer>,

    /// Ordered list of artifact paths (absolute or relative to
    /// `/mnt/results`/`/mnt/metadata`) that scanners are expected to
    /// produce and the extractor transfers to the upload side.
    #[serde(default)]
    pub artifact_paths: Vec<String>,

    /// Ordered uploader bindings. Each name is resolved against the
    /// Uploader/ClusterUploader registry at validation and workload-build
    /// time.
    #[serde(default)]
    pub uploaders: Vec<UploaderBinding>,
}
