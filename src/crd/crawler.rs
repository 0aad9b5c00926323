//! Crawler registry: namespaced and cluster-scoped variants.
//!
//! A Crawler is a `UserContainerWithParameters` run as the main container
//! of a Search's workload. Parameters are injected as `OCULAR_PARAM_<NAME>`
//! environment variables alongside the service-account and FIFO wiring the
//! Search Engine adds.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::UserContainerWithParameters;

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ocular.crashoverride.run",
    version = "v1beta1",
    kind = "Crawler",
    namespaced,
    shortname = "cr",
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerSpec {
    #[serde(flatten)]
    pub container: UserContainerWithParameters,
}

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ocular.crashoverride.run",
    version = "v1beta1",
    kind = "ClusterCrawler",
    shortname = "ccr",
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCrawlerSpec {
    #[serde(flatten)]
    pub container: UserContainerWithParameters,
}
