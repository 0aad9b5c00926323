//! Resource Model & Validation.
//!
//! `Validate(resource, clusterCtx) → ok | fails(BadRequest, reason)`. Every
//! Profile stored in the registry must pass re-validation against the live
//! Downloader/Uploader/Secret registries — these functions are called both
//! when a Profile is first authored and again, implicitly, every time the
//! Pipeline Engine builds a workload from it.

use k8s_openapi::api::core::v1::Secret;
use kube::{api::Api, Client};

use crate::crd::{
    ClusterCrawler, ClusterDownloader, ClusterUploader, Downloader, ParameterDefinition,
    ParameterizedObjectReference, ProfileSpec, SecretMount, SecretRef, Target, UploaderBinding,
    UserContainer, UserContainerWithParameters, Uploader,
};
use crate::crd::Crawler;
use crate::error::{Error, Result};

/// Check a single SecretRef's mount shape: file mounts must be absolute,
/// env-var mounts just need a non-empty target name.
pub fn validate_secret_ref_shape(secret: &SecretRef) -> Result<()> {
    if secret.secret_name.trim().is_empty() {
        return Err(Error::ValidationError(
            "secretRef.secretName must not be empty".to_string(),
        ));
    }
    if secret.key.trim().is_empty() {
        return Err(Error::ValidationError(
            "secretRef.key must not be empty".to_string(),
        ));
    }
    match &secret.mount {
        SecretMount::File { path } => {
            if !path.starts_with('/') {
                return Err(Error::ValidationError(format!(
                    "secretRef file mount path {path:?} must be absolute"
                )));
            }
        }
        SecretMount::EnvVar { name } => {
            if name.trim().is_empty() {
                return Err(Error::ValidationError(
                    "secretRef env var mount must name a target variable".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Check that a SecretRef marked `required` actually has its key present in
/// the backing Secret. Absent optional refs are fine — the Pod still runs
/// with the projected secrets volume marked optional.
pub async fn validate_secret_ref_presence(
    client: &Client,
    namespace: &str,
    secret: &SecretRef,
) -> Result<()> {
    if !secret.required {
        return Ok(());
    }
    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    match api.get(&secret.secret_name).await {
        Ok(obj) => {
            let has_key = obj
                .data
                .as_ref()
                .map(|d| d.contains_key(&secret.key))
                .unwrap_or(false)
                || obj
                    .string_data
                    .as_ref()
                    .map(|d| d.contains_key(&secret.key))
                    .unwrap_or(false);
            if has_key {
                Ok(())
            } else {
                Err(Error::ValidationError(format!(
                    "required secret key {:?} not found in secret {:?}",
                    secret.key, secret.secret_name
                )))
            }
        }
        Err(kube::Error::Api(e)) if e.code == 404 => Err(Error::ValidationError(format!(
            "required secret {:?} not found",
            secret.secret_name
        ))),
        Err(e) => Err(Error::KubeError(e)),
    }
}

/// Validate a `UserContainer`'s secret mounts (shape only; presence checks
/// require a cluster round trip, done separately via
/// `validate_container_secrets_present`).
pub fn validate_user_container(container: &UserContainer) -> Result<()> {
    if container.image.trim().is_empty() {
        return Err(Error::ValidationError(
            "container image must not be empty".to_string(),
        ));
    }
    for secret in &container.secrets {
        validate_secret_ref_shape(secret)?;
    }
    Ok(())
}

pub async fn validate_container_secrets_present(
    client: &Client,
    namespace: &str,
    container: &UserContainer,
) -> Result<()> {
    for secret in &container.secrets {
        validate_secret_ref_presence(client, namespace, secret).await?;
    }
    Ok(())
}

/// Validate a ParameterSchema: parameter names must pass the `[A-Za-z0-9_-]`
/// / length rule, and a required parameter with a default is invalid.
pub fn validate_parameter_schema(
    parameters: &std::collections::BTreeMap<String, ParameterDefinition>,
) -> Result<()> {
    for (name, def) in parameters {
        if !crate::crd::is_valid_param_name(name) {
            return Err(Error::ValidationError(format!(
                "parameter name {name:?} is invalid: must be non-empty, at most 63 characters, and match [A-Za-z0-9_-]"
            )));
        }
        if def.required && def.default.is_some() {
            return Err(Error::ValidationError(format!(
                "parameter {name:?} cannot be both required and carry a default"
            )));
        }
    }
    Ok(())
}

pub fn validate_user_container_with_parameters(c: &UserContainerWithParameters) -> Result<()> {
    validate_user_container(&c.container)?;
    validate_parameter_schema(&c.parameters)
}

/// Validate that a binding supplies every required parameter of the
/// resolved schema, and that it doesn't name parameters the schema doesn't
/// declare.
pub fn validate_binding_against_schema(
    binding_parameters: &std::collections::BTreeMap<String, String>,
    schema: &std::collections::BTreeMap<String, ParameterDefinition>,
) -> Result<()> {
    for (name, def) in schema {
        if def.required && !binding_parameters.contains_key(name) {
            return Err(Error::ValidationError(format!(
                "required parameter {name:?} was not supplied"
            )));
        }
    }
    for name in binding_parameters.keys() {
        if !schema.contains_key(name) {
            return Err(Error::ValidationError(format!(
                "parameter {name:?} is not declared by this uploader's schema"
            )));
        }
    }
    Ok(())
}

/// Resolve an uploader binding's name against the namespaced Uploader
/// registry, falling back to the cluster-scoped ClusterUploader registry.
/// Namespaced wins on name collision (see DESIGN.md).
pub async fn resolve_uploader(
    client: &Client,
    namespace: &str,
    binding: &UploaderBinding,
) -> Result<UserContainerWithParameters> {
    let namespaced: Api<Uploader> = Api::namespaced(client.clone(), namespace);
    match namespaced.get(&binding.name).await {
        Ok(uploader) => return Ok(uploader.spec.container),
        Err(kube::Error::Api(e)) if e.code == 404 => {}
        Err(e) => return Err(Error::KubeError(e)),
    }

    let cluster_scoped: Api<ClusterUploader> = Api::all(client.clone());
    match cluster_scoped.get(&binding.name).await {
        Ok(uploader) => Ok(uploader.spec.container),
        Err(kube::Error::Api(e)) if e.code == 404 => Err(Error::UnknownReference(format!(
            "uploader {:?} not found in namespace {namespace:?} or cluster scope",
            binding.name
        ))),
        Err(e) => Err(Error::KubeError(e)),
    }
}

/// Resolve a Target's downloader name against the namespaced Downloader
/// registry, falling back to the cluster-scoped ClusterDownloader registry.
pub async fn resolve_downloader(
    client: &Client,
    namespace: &str,
    target: &Target,
) -> Result<UserContainer> {
    let namespaced: Api<Downloader> = Api::namespaced(client.clone(), namespace);
    match namespaced.get(&target.downloader).await {
        Ok(downloader) => return Ok(downloader.spec.container),
        Err(kube::Error::Api(e)) if e.code == 404 => {}
        Err(e) => return Err(Error::KubeError(e)),
    }

    let cluster_scoped: Api<ClusterDownloader> = Api::all(client.clone());
    match cluster_scoped.get(&target.downloader).await {
        Ok(downloader) => Ok(downloader.spec.container),
        Err(kube::Error::Api(e)) if e.code == 404 => Err(Error::UnknownReference(format!(
            "downloader {:?} not found in namespace {namespace:?} or cluster scope",
            target.downloader
        ))),
        Err(e) => Err(Error::KubeError(e)),
    }
}

/// Validate a Target: the identifier must be non-empty, and its downloader
/// must resolve against the registry.
pub async fn validate_target(client: &Client, namespace: &str, target: &Target) -> Result<()> {
    if target.identifier.trim().is_empty() {
        return Err(Error::ValidationError(
            "target.identifier must not be empty".to_string(),
        ));
    }
    resolve_downloader(client, namespace, target).await?;
    Ok(())
}

/// Resolve a Search's crawler reference against the namespaced Crawler
/// registry, falling back to the cluster-scoped ClusterCrawler registry,
/// and check its binding against the resolved parameter schema.
pub async fn resolve_crawler(
    client: &Client,
    namespace: &str,
    crawler_ref: &ParameterizedObjectReference,
) -> Result<UserContainerWithParameters> {
    let namespaced: Api<Crawler> = Api::namespaced(client.clone(), namespace);
    let resolved = match namespaced.get(&crawler_ref.name).await {
        Ok(crawler) => crawler.spec.container,
        Err(kube::Error::Api(e)) if e.code == 404 => {
            let cluster_scoped: Api<ClusterCrawler> = Api::all(client.clone());
            match cluster_scoped.get(&crawler_ref.name).await {
                Ok(crawler) => crawler.spec.container,
                Err(kube::Error::Api(e)) if e.code == 404 => {
                    return Err(Error::UnknownReference(format!(
                        "crawler {:?} not found in namespace {namespace:?} or cluster scope",
                        crawler_ref.name
                    )))
                }
                Err(e) => return Err(Error::KubeError(e)),
            }
        }
        Err(e) => return Err(Error::KubeError(e)),
    };

    validate_parameter_schema(&resolved.parameters)?;
    validate_binding_against_schema(&crawler_ref.parameters, &resolved.parameters)?;
    Ok(resolved)
}

/// Validate a Profile: every embedded scanner container, and every
/// uploader binding resolved against the live registry with its
/// parameters checked against the resolved schema.
pub async fn validate_profile(client: &Client, namespace: &str, profile: &ProfileSpec) -> Result<()> {
    for scanner in &profile.scanners {
        validate_user_container(scanner)?;
    }
    for binding in &profile.uploaders {
        let uploader = resolve_uploader(client, namespace, binding).await?;
        validate_parameter_schema(&uploader.parameters)?;
        validate_binding_against_schema(&binding.parameters, &uploader.parameters)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn schema(required: bool, default: Option<&str>) -> BTreeMap<String, ParameterDefinition> {
        let mut m = BTreeMap::new();
        m.insert(
            "token".to_string(),
            ParameterDefinition {
                description: "".to_string(),
                required,
                default: default.map(|s| s.to_string()),
            },
        );
        m
    }

    #[test]
    fn required_with_default_is_invalid() {
        let s = schema(true, Some("x"));
        assert!(validate_parameter_schema(&s).is_err());
    }

    #[test]
    fn required_without_value_fails_binding() {
        let s = schema(true, None);
        let binding = BTreeMap::new();
        assert!(validate_binding_against_schema(&binding, &s).is_err());
    }

    #[test]
    fn unknown_binding_parameter_fails() {
        let s = schema(false, Some("x"));
        let mut binding = BTreeMap::new();
        binding.insert("bogus".to_string(), "1".to_string());
        assert!(validate_binding_against_schema(&binding, &s).is_err());
    }

    #[test]
    fn file_mount_requires_absolute_path() {
        let secret = SecretRef {
            secret_name: "s".to_string(),
            key: "k".to_string(),
            mount: SecretMount::File {
                path: "relative/path".to_string(),
            },
            required: false,
        };
        assert!(validate_secret_ref_shape(&secret).is_err());
    }
}
