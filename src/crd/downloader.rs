//! Downloader registry: namespaced and cluster-scoped variants.
//!
//! A Downloader is a bare `UserContainer` — the Pipeline Engine resolves a
//! Target's `downloader` name against this registry (namespaced preferred
//! over cluster-scoped on collision, see DESIGN.md) before building the
//! scan workload's init container.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::UserContainer;

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ocular.crashoverride.run",
    version = "v1beta1",
    kind = "Downloader",
    namespaced,
    shortname = "dl",
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DownloaderSpec {
    #[serde(flatten)]
    pub container: UserContainer,
}

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ocular.crashoverride.run",
    version = "v1beta1",
    kind = "ClusterDownloader",
    shortname = "cdl",
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDownloaderSpec {
    #[serde(flatten)]
    pub container: UserContainer,
}
