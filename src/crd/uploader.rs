//! Uploader registry: namespaced and cluster-scoped variants.
//!
//! An Uploader is a `UserContainerWithParameters`. Profiles bind uploaders
//! by name; the Pipeline Engine resolves the binding against this registry
//! at Profile-validation time and again at workload-build time.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::UserContainerWithParameters;

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ocular.crashoverride.run",
    version = "v1beta1",
    kind = "Uploader",
    namespaced,
    shortname = "ul",
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct UploaderSpec {
    #[serde(flatten)]
    pub container: UserContainerWithParameters,
}

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ocular.crashoverride.run",
    version = "v1beta1",
    kind = "ClusterUploader",
    shortname = "cul",
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterUploaderSpec {
    #[serde(flatten)]
    pub container: UserContainerWithParameters,
}
