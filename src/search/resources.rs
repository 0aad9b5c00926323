//! Kubernetes resource builders for a Search's crawler workload: a Pod
//! running the crawler container alongside the scheduler sidecar, sharing
//! an `emptyDir` that holds the pipeline-fifo/search-fifo named pipes, plus
//! the disposable ServiceAccount/RoleBinding provisioned when the Search
//! spec names none.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    EmptyDirVolumeSource, EnvVar as K8sEnvVar, Pod, PodSpec, ProjectedVolumeSource,
    ServiceAccount, ServiceAccountTokenProjection, Volume, VolumeMount, VolumeProjection,
};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use tracing::{info, instrument};

use crate::crd::{ParameterizedObjectReference, Search, UserContainerWithParameters};
use crate::error::{Error, Result};

pub const FIFO_VOLUME_NAME: &str = "ocular-fifo";
pub const FIFO_MOUNT_PATH: &str = "/var/run/ocular";
pub const PIPELINE_FIFO_PATH: &str = "/var/run/ocular/pipeline-fifo";
pub const SEARCH_FIFO_PATH: &str = "/var/run/ocular/search-fifo";
pub const SCHEDULER_SIDECAR_IMAGE: &str = "ghcr.io/ocular/scheduler-sidecar:latest";
pub const FIELD_MANAGER: &str = "ocular-operator";
pub const TOKEN_VOLUME_NAME: &str = "ocular-crawler-token";
pub const TOKEN_MOUNT_PATH: &str = "/var/run/secrets/ocular/crawler";
pub const TOKEN_FILE_NAME: &str = "token";

pub fn standard_labels(search: &Search) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app.kubernetes.io/name".to_string(), "ocular-search".to_string());
    labels.insert("app.kubernetes.io/instance".to_string(), search.name_any());
    labels.insert("app.kubernetes.io/managed-by".to_string(), "ocular-operator".to_string());
    labels.insert(crate::crd::SEARCH_LABEL.to_string(), search.name_any());
    labels
}

pub fn owner_reference(search: &Search) -> OwnerReference {
    OwnerReference {
        api_version: Search::api_version(&()).to_string(),
        kind: Search::kind(&()).to_string(),
        name: search.name_any(),
        uid: search.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

pub fn pod_name(search: &Search) -> String {
    search.name_any()
}

pub fn service_account_name(search: &Search) -> String {
    format!("{}-search", search.name_any())
}

/// Build the crawler+scheduler-sidecar Pod. The crawler's own parameters
/// come in as `OCULAR_PARAM_<NAME>` env vars (the same convention used for
/// Uploaders); the sidecar gets the dispatch interval and FIFO paths.
pub fn build_pod(
    search: &Search,
    crawler_ref: &ParameterizedObjectReference,
    crawler: &UserContainerWithParameters,
    service_account: &str,
    context_name: &str,
    api_base_url: &str,
) -> Pod {
    let labels = standard_labels(search);

    let mut env: Vec<K8sEnvVar> = crawler
        .container
        .env
        .iter()
        .map(|e| K8sEnvVar {
            name: e.name.clone(),
            value: Some(e.value.clone()),
            ..Default::default()
        })
        .collect();
    for (name, def) in &crawler.parameters {
        let value = crawler_ref.parameters.get(name).or(def.default.as_ref());
        if let Some(value) = value {
            env.push(K8sEnvVar {
                name: crate::crd::param_env_name(name),
                value: Some(value.clone()),
                ..Default::default()
            });
        }
    }
    env.push(K8sEnvVar {
        name: "OCULAR_PIPELINE_FIFO".to_string(),
        value: Some(PIPELINE_FIFO_PATH.to_string()),
        ..Default::default()
    });
    env.push(K8sEnvVar {
        name: "OCULAR_SEARCH_FIFO".to_string(),
        value: Some(SEARCH_FIFO_PATH.to_string()),
        ..Default::default()
    });
    env.push(K8sEnvVar {
        name: "OCULAR_SERVICE_ACCOUNT_TOKEN_PATH".to_string(),
        value: Some(format!("{TOKEN_MOUNT_PATH}/{TOKEN_FILE_NAME}")),
        ..Default::default()
    });
    env.push(K8sEnvVar {
        name: "OCULAR_API_BASE_URL".to_string(),
        value: Some(api_base_url.to_string()),
        ..Default::default()
    });
    env.push(K8sEnvVar {
        name: "OCULAR_CRAWLER_NAME".to_string(),
        value: Some(crawler_ref.name.clone()),
        ..Default::default()
    });
    env.push(K8sEnvVar {
        name: "OCULAR_CONTEXT_NAME".to_string(),
        value: Some(context_name.to_string()),
        ..Default::default()
    });

    let fifo_mount = VolumeMount {
        name: FIFO_VOLUME_NAME.to_string(),
        mount_path: FIFO_MOUNT_PATH.to_string(),
        ..Default::default()
    };
    let token_mount = VolumeMount {
        name: TOKEN_VOLUME_NAME.to_string(),
        mount_path: TOKEN_MOUNT_PATH.to_string(),
        read_only: Some(true),
        ..Default::default()
    };

    let crawler_container = k8s_openapi::api::core::v1::Container {
        name: "crawler".to_string(),
        image: Some(crawler.container.image.clone()),
        image_pull_policy: crawler.container.pull_policy.clone(),
        command: crawler.container.command.clone(),
        args: crawler.container.args.clone(),
        env: Some(env),
        volume_mounts: Some(vec![fifo_mount.clone(), token_mount]),
        ..Default::default()
    };

    let sidecar = k8s_openapi::api::core::v1::Container {
        name: "scheduler-sidecar".to_string(),
        image: Some(SCHEDULER_SIDECAR_IMAGE.to_string()),
        env: Some(vec![
            K8sEnvVar {
                name: "OCULAR_SEARCH_NAME".to_string(),
                value: Some(search.name_any()),
                ..Default::default()
            },
            K8sEnvVar {
                name: "OCULAR_SEARCH_NAMESPACE".to_string(),
                value: search.namespace(),
                ..Default::default()
            },
            K8sEnvVar {
                name: "OCULAR_DISPATCH_INTERVAL_SECONDS".to_string(),
                value: Some(search.spec.effective_interval().to_string()),
                ..Default::default()
            },
            K8sEnvVar {
                name: "OCULAR_PIPELINE_FIFO".to_string(),
                value: Some(PIPELINE_FIFO_PATH.to_string()),
                ..Default::default()
            },
            K8sEnvVar {
                name: "OCULAR_SEARCH_FIFO".to_string(),
                value: Some(SEARCH_FIFO_PATH.to_string()),
                ..Default::default()
            },
            K8sEnvVar {
                name: "OCULAR_SIDECAR_SCHEDULER_COMPLETE_PATH".to_string(),
                value: Some("/var/run/ocular/complete".to_string()),
                ..Default::default()
            },
        ]),
        volume_mounts: Some(vec![fifo_mount]),
        ..Default::default()
    };

    Pod {
        metadata: ObjectMeta {
            name: Some(pod_name(search)),
            namespace: search.namespace(),
            labels: Some(labels),
            owner_references: Some(vec![owner_reference(search)]),
            ..Default::default()
        },
        spec: Some(PodSpec {
            restart_policy: Some("Never".to_string()),
            service_account_name: Some(service_account.to_string()),
            containers: vec![crawler_container, sidecar],
            volumes: Some(vec![
                Volume {
                    name: FIFO_VOLUME_NAME.to_string(),
                    empty_dir: Some(EmptyDirVolumeSource::default()),
                    ..Default::default()
                },
                Volume {
                    name: TOKEN_VOLUME_NAME.to_string(),
                    projected: Some(ProjectedVolumeSource {
                        sources: Some(vec![VolumeProjection {
                            service_account_token: Some(ServiceAccountTokenProjection {
                                audience: Some("crawler".to_string()),
                                path: TOKEN_FILE_NAME.to_string(),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }),
        status: None,
    }
}

/// Minimal ServiceAccount, scoped to one Search, cascade deleted via owner
/// reference.
fn build_service_account(search: &Search) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(service_account_name(search)),
            namespace: search.namespace(),
            labels: Some(standard_labels(search)),
            owner_references: Some(vec![owner_reference(search)]),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn build_role_binding(search: &Search) -> RoleBinding {
    let name = service_account_name(search);
    RoleBinding {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: search.namespace(),
            labels: Some(standard_labels(search)),
            owner_references: Some(vec![owner_reference(search)]),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: name.clone(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name,
            namespace: search.namespace(),
            ..Default::default()
        }]),
    }
}

/// Role granting exactly the verbs a Search's crawler needs: create/get
/// Pipelines and Searches, plus the Jobs and ConfigMaps the crawler's
/// own dispatched work depends on, all scoped to the Search's namespace.
pub fn pipeline_creator_role_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule {
            api_groups: Some(vec!["ocular.crashoverride.run".to_string()]),
            resources: Some(vec!["pipelines".to_string(), "searches".to_string()]),
            verbs: vec!["create".to_string(), "get".to_string(), "list".to_string()],
            ..Default::default()
        },
        PolicyRule {
            api_groups: Some(vec!["batch".to_string()]),
            resources: Some(vec!["jobs".to_string()]),
            verbs: vec!["create".to_string(), "get".to_string()],
            ..Default::default()
        },
        PolicyRule {
            api_groups: Some(vec!["".to_string()]),
            resources: Some(vec!["configmaps".to_string()]),
            verbs: vec!["create".to_string(), "get".to_string()],
            ..Default::default()
        },
    ]
}

fn build_role(search: &Search) -> Role {
    Role {
        metadata: ObjectMeta {
            name: Some(service_account_name(search)),
            namespace: search.namespace(),
            labels: Some(standard_labels(search)),
            owner_references: Some(vec![owner_reference(search)]),
            ..Default::default()
        },
        rules: Some(pipeline_creator_role_rules()),
    }
}

/// Provision the disposable ServiceAccount, its Role (create/get on
/// pipelines, searches, jobs, configmaps) and the RoleBinding tying the
/// two together, for a Search with no `serviceAccountName` of its own.
#[instrument(skip(client, search), fields(name = %search.name_any()))]
pub async fn ensure_disposable_service_account(client: &Client, search: &Search) -> Result<String> {
    let namespace = search.namespace().unwrap_or_else(|| "default".to_string());
    let sa_api: Api<ServiceAccount> = Api::namespaced(client.clone(), &namespace);
    let role_api: Api<Role> = Api::namespaced(client.clone(), &namespace);
    let rb_api: Api<RoleBinding> = Api::namespaced(client.clone(), &namespace);

    let sa = build_service_account(search);
    sa_api
        .patch(
            &service_account_name(search),
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&sa),
        )
        .await?;

    let role = build_role(search);
    role_api
        .patch(
            &service_account_name(search),
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&role),
        )
        .await?;

    let rb = build_role_binding(search);
    rb_api
        .patch(
            &service_account_name(search),
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&rb),
        )
        .await?;

    Ok(service_account_name(search))
}

pub async fn apply_pod(client: &Client, namespace: &str, pod: &Pod) -> Result<()> {
    let api: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let name = pod.metadata.name.clone().unwrap_or_default();
    match api.get(&name).await {
        Ok(_) => {}
        Err(kube::Error::Api(e)) if e.code == 404 => {
            api.create(&Default::default(), pod).await?;
        }
        Err(e) => return Err(Error::KubeError(e)),
    }
    Ok(())
}

pub async fn get_pod(client: &Client, namespace: &str, name: &str) -> Result<Option<Pod>> {
    let api: Api<Pod> = Api::namespaced(client.clone(), namespace);
    match api.get(name).await {
        Ok(p) => Ok(Some(p)),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
        Err(e) => Err(Error::KubeError(e)),
    }
}

#[instrument(skip(client, search), fields(name = %search.name_any()))]
pub async fn delete_search_workload(client: &Client, search: &Search) -> Result<()> {
    let namespace = search.namespace().unwrap_or_else(|| "default".to_string());
    let pod_api: Api<Pod> = Api::namespaced(client.clone(), &namespace);
    match pod_api.delete(&pod_name(search), &DeleteParams::default()).await {
        Ok(_) => info!("deleted search pod"),
        Err(kube::Error::Api(e)) if e.code == 404 => {}
        Err(e) => return Err(Error::KubeError(e)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::SearchSpec;

    fn test_search() -> Search {
        let spec = SearchSpec {
            crawler: ParameterizedObjectReference {
                name: "my-crawler".to_string(),
                parameters: Default::default(),
            },
            pipeline_template: None,
            interval_seconds: None,
            service_account_name: None,
            ttl_seconds_max_lifetime: None,
        };
        let mut search = Search::new("crawl-demo", spec);
        search.metadata.namespace = Some("default".to_string());
        search.metadata.uid = Some("22222222-2222-2222-2222-222222222222".to_string());
        search
    }

    #[test]
    fn crawler_container_carries_context_and_token_env() {
        let search = test_search();
        let crawler_ref = search.spec.crawler.clone();
        let crawler = UserContainerWithParameters {
            container: crate::crd::UserContainer {
                image: "ghcr.io/ocular/demo-crawler:latest".to_string(),
                pull_policy: None,
                command: None,
                args: None,
                env: vec![],
                secrets: vec![],
            },
            parameters: Default::default(),
        };

        let pod = build_pod(&search, &crawler_ref, &crawler, "crawl-demo-search", "prod", "https://k8s.example.com:6443");
        let spec = pod.spec.unwrap();
        let crawler_container = spec.containers.iter().find(|c| c.name == "crawler").unwrap();
        let env = crawler_container.env.as_ref().unwrap();
        let value_of = |name: &str| env.iter().find(|e| e.name == name).and_then(|e| e.value.clone());

        assert_eq!(
            value_of("OCULAR_SERVICE_ACCOUNT_TOKEN_PATH").as_deref(),
            Some(format!("{TOKEN_MOUNT_PATH}/{TOKEN_FILE_NAME}").as_str())
        );
        assert_eq!(value_of("OCULAR_API_BASE_URL").as_deref(), Some("https://k8s.example.com:6443"));
        assert_eq!(value_of("OCULAR_CRAWLER_NAME").as_deref(), Some("my-crawler"));
        assert_eq!(value_of("OCULAR_CONTEXT_NAME").as_deref(), Some("prod"));

        let volumes = spec.volumes.unwrap();
        assert!(volumes.iter().any(|v| v.name == TOKEN_VOLUME_NAME && v.projected.is_some()));
        let mounts = crawler_container.volume_mounts.as_ref().unwrap();
        assert!(mounts.iter().any(|m| m.name == TOKEN_VOLUME_NAME && m.mount_path == TOKEN_MOUNT_PATH));
    }

    #[test]
    fn pipeline_creator_role_rules_cover_jobs_and_configmaps() {
        let rules = pipeline_creator_role_rules();

        let resources_for = |api_group: &str| {
            rules
                .iter()
                .find(|r| r.api_groups.as_deref() == Some([api_group.to_string()].as_slice()))
                .and_then(|r| r.resources.clone())
                .unwrap_or_default()
        };

        assert!(resources_for("ocular.crashoverride.run").contains(&"pipelines".to_string()));
        assert!(resources_for("ocular.crashoverride.run").contains(&"searches".to_string()));
        assert!(resources_for("batch").contains(&"jobs".to_string()));
        assert!(resources_for("").contains(&"configmaps".to_string()));
    }

    #[test]
    fn role_binding_points_at_the_role_this_engine_provisions() {
        let search = test_search();
        let role = build_role(&search);
        let rb = build_role_binding(&search);

        assert_eq!(rb.role_ref.kind, "Role");
        assert_eq!(rb.role_ref.name, role.metadata.name.clone().unwrap());
        assert_eq!(role.metadata.name.unwrap(), service_account_name(&search));
    }
}
