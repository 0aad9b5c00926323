//! Kubernetes resource builders for the scan and upload workloads of a
//! Pipeline.
//!
//! Mirrors the controller's workload-builder pattern: `standard_labels` /
//! `owner_reference` / `resource_name` helpers, `build_*` functions that
//! return a plain object, and `ensure_*`/`delete_*` wrappers that apply or
//! tear the object down via the typed API.

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EmptyDirVolumeSource, EnvVar as K8sEnvVar, Pod, PodSpec,
    PodTemplateSpec, Secret, SecretKeySelector, SecretVolumeSource, Service, ServicePort,
    ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use tracing::{info, instrument, warn};

use crate::crd::{Pipeline, ProfileSpec, SecretMount, Target, UserContainer, UserContainerWithParameters};
use crate::error::{Error, Result};

pub const EXTRACTOR_IMAGE: &str = "ghcr.io/ocular/extractor:latest";
pub const FIELD_MANAGER: &str = "ocular-operator";
pub const UPLOAD_SERVICE_PORT: i32 = 8080;

pub fn standard_labels(pipeline: &Pipeline) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app.kubernetes.io/name".to_string(), "ocular-pipeline".to_string());
    labels.insert("app.kubernetes.io/instance".to_string(), pipeline.name_any());
    labels.insert("app.kubernetes.io/managed-by".to_string(), "ocular-operator".to_string());
    labels.insert("ocular.crashoverride.run/pipeline".to_string(), pipeline.name_any());
    labels
}

pub fn owner_reference(pipeline: &Pipeline) -> OwnerReference {
    OwnerReference {
        api_version: Pipeline::api_version(&()).to_string(),
        kind: Pipeline::kind(&()).to_string(),
        name: pipeline.name_any(),
        uid: pipeline.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

pub fn scan_job_name(pipeline: &Pipeline) -> String {
    format!("{}-scan", pipeline.name_any())
}

pub fn upload_job_name(pipeline: &Pipeline) -> String {
    format!("{}-upload", pipeline.name_any())
}

pub fn upload_service_name(pipeline: &Pipeline) -> String {
    format!("{}-upload", pipeline.name_any())
}

fn secret_volume_mount(secret: &crate::crd::SecretRef) -> Option<(Volume, VolumeMount)> {
    if let SecretMount::File { path } = &secret.mount {
        let mount_dir = std::path::Path::new(path)
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| "/mnt/secrets".to_string());
        let volume_name = format!("secret-{}", secret.secret_name.replace('.', "-"));
        let volume = Volume {
            name: volume_name.clone(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(secret.secret_name.clone()),
                optional: Some(!secret.required),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mount = VolumeMount {
            name: volume_name,
            mount_path: mount_dir,
            read_only: Some(true),
            ..Default::default()
        };
        Some((volume, mount))
    } else {
        None
    }
}

fn apply_secret_env(container: &mut Container, secrets: &[crate::crd::SecretRef]) {
    let mut env = container.env.clone().unwrap_or_default();
    for secret in secrets {
        if let SecretMount::EnvVar { name } = &secret.mount {
            env.push(K8sEnvVar {
                name: name.clone(),
                value_from: Some(k8s_openapi::api::core::v1::EnvVarSource {
                    secret_key_ref: Some(SecretKeySelector {
                        name: Some(secret.secret_name.clone()),
                        key: secret.key.clone(),
                        optional: Some(!secret.required),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }
    }
    if !env.is_empty() {
        container.env = Some(env);
    }
}

fn build_user_container(name: &str, spec: &UserContainer, extra_env: Vec<K8sEnvVar>) -> (Container, Vec<Volume>, Vec<VolumeMount>) {
    let mut env: Vec<K8sEnvVar> = spec
        .env
        .iter()
        .map(|e| K8sEnvVar {
            name: e.name.clone(),
            value: Some(e.value.clone()),
            ..Default::default()
        })
        .collect();
    env.extend(extra_env);

    let mut volumes = Vec::new();
    let mut mounts = Vec::new();
    for secret in &spec.secrets {
        if let Some((v, m)) = secret_volume_mount(secret) {
            volumes.push(v);
            mounts.push(m);
        }
    }

    let mut container = Container {
        name: name.to_string(),
        image: Some(spec.image.clone()),
        image_pull_policy: spec.pull_policy.clone(),
        command: spec.command.clone(),
        args: spec.args.clone(),
        env: Some(env),
        volume_mounts: Some(mounts.clone()),
        ..Default::default()
    };
    apply_secret_env(&mut container, &spec.secrets);
    (container, volumes, mounts)
}

/// Build the scan workload: downloader init container → N scanner main
/// containers running in parallel → extractor sidecar running alongside in
/// `restart: Always` (sidecar) mode, draining `/mnt/results`/`/mnt/metadata`
/// to the upload Service as scanners produce artifacts.
pub fn build_scan_job(
    pipeline: &Pipeline,
    target: &Target,
    downloader: &UserContainer,
    profile: &ProfileSpec,
    workload_timeout_seconds: i64,
) -> Job {
    let labels = standard_labels(pipeline);
    let name = scan_job_name(pipeline);

    let results_volume = Volume {
        name: "results".to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    };
    let target_volume = Volume {
        name: "target".to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    };

    let target_mount = VolumeMount {
        name: "target".to_string(),
        mount_path: "/mnt/target".to_string(),
        ..Default::default()
    };
    let results_mount = VolumeMount {
        name: "results".to_string(),
        mount_path: "/mnt/results".to_string(),
        ..Default::default()
    };

    let uploader_host = format!(
        "http://{}.{}.svc.cluster.local:{UPLOAD_SERVICE_PORT}",
        upload_service_name(pipeline),
        pipeline.namespace().unwrap_or_else(|| "default".to_string())
    );

    let (mut downloader_container, mut volumes, _) = build_user_container(
        "downloader",
        downloader,
        vec![
            K8sEnvVar {
                name: "OCULAR_TARGET_DOWNLOADER".to_string(),
                value: Some(target.downloader.clone()),
                ..Default::default()
            },
            K8sEnvVar {
                name: "OCULAR_TARGET_IDENTIFIER".to_string(),
                value: Some(target.identifier.clone()),
                ..Default::default()
            },
            K8sEnvVar {
                name: "OCULAR_TARGET_VERSION".to_string(),
                value: target.version.clone(),
                ..Default::default()
            },
            K8sEnvVar {
                name: "OCULAR_TARGET_DIR".to_string(),
                value: Some("/mnt/target".to_string()),
                ..Default::default()
            },
            K8sEnvVar {
                name: "OCULAR_RESULTS_DIR".to_string(),
                value: Some("/mnt/results".to_string()),
                ..Default::default()
            },
            K8sEnvVar {
                name: "OCULAR_PROFILE_NAME".to_string(),
                value: Some(pipeline.spec.profile_name.clone()),
                ..Default::default()
            },
            K8sEnvVar {
                name: "OCULAR_PIPELINE_ID".to_string(),
                value: Some(pipeline.uid().unwrap_or_default()),
                ..Default::default()
            },
            K8sEnvVar {
                name: "OCULAR_UPLOADER_HOST".to_string(),
                value: Some(uploader_host.clone()),
                ..Default::default()
            },
        ],
    );
    downloader_container.working_dir = Some("/mnt/target".to_string());
    downloader_container
        .volume_mounts
        .get_or_insert_with(Vec::new)
        .push(target_mount.clone());

    let mut main_containers = Vec::new();
    for (i, scanner) in profile.scanners.iter().enumerate() {
        let (mut c, vols, _) = build_user_container(&format!("scanner-{i}"), scanner, vec![]);
        c.working_dir = Some("/mnt/target".to_string());
        c.volume_mounts
            .get_or_insert_with(Vec::new)
            .extend(vec![target_mount.clone(), results_mount.clone()]);
        volumes.extend(vols);
        main_containers.push(c);
    }

    let extractor_mode = if profile.uploaders.is_empty() { "ignore" } else { "extract" };
    let mut extractor_args = vec![extractor_mode.to_string(), "--".to_string()];
    extractor_args.extend(profile.artifact_paths.iter().cloned());
    let extractor = Container {
        name: "extractor".to_string(),
        image: Some(EXTRACTOR_IMAGE.to_string()),
        args: Some(extractor_args),
        // Native sidecar: an init container that keeps running alongside
        // the scanners instead of blocking on them.
        restart_policy: Some("Always".to_string()),
        working_dir: Some("/mnt/results".to_string()),
        env: Some(vec![K8sEnvVar {
            name: "OCULAR_UPLOADER_HOST".to_string(),
            value: Some(uploader_host),
            ..Default::default()
        }]),
        volume_mounts: Some(vec![results_mount.clone()]),
        ..Default::default()
    };

    volumes.push(results_volume);
    volumes.push(target_volume);

    Job {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: pipeline.namespace(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(pipeline)]),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            active_deadline_seconds: Some(workload_timeout_seconds),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("Never".to_string()),
                    init_containers: Some(vec![downloader_container, extractor]),
                    containers: main_containers,
                    volumes: Some(volumes),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// Build the upload workload: a receive-artifacts init container (the
/// extractor binary in `receive` mode) followed by one main container per
/// bound uploader, each with its resolved parameters as
/// `OCULAR_PARAM_<NAME>` env vars.
pub fn build_upload_job(
    pipeline: &Pipeline,
    uploaders: &[(crate::crd::UploaderBinding, UserContainerWithParameters)],
    artifact_paths: &[String],
    workload_timeout_seconds: i64,
) -> Job {
    let labels = standard_labels(pipeline);
    let name = upload_job_name(pipeline);

    let results_volume = Volume {
        name: "results".to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    };
    let results_mount = VolumeMount {
        name: "results".to_string(),
        mount_path: "/mnt/results".to_string(),
        ..Default::default()
    };

    let mut receiver_args = vec!["receive".to_string(), "--".to_string()];
    receiver_args.extend(artifact_paths.iter().cloned());
    let receiver = Container {
        name: "receive-artifacts".to_string(),
        image: Some(EXTRACTOR_IMAGE.to_string()),
        args: Some(receiver_args),
        env: Some(vec![K8sEnvVar {
            name: "OCULAR_EXTRACTOR_PORT".to_string(),
            value: Some(UPLOAD_SERVICE_PORT.to_string()),
            ..Default::default()
        }]),
        volume_mounts: Some(vec![results_mount.clone()]),
        ..Default::default()
    };

    let mut volumes = vec![results_volume];
    let mut containers = Vec::new();
    for (binding, resolved) in uploaders {
        let mut extra_env: Vec<K8sEnvVar> = binding
            .parameters
            .iter()
            .chain(
                resolved
                    .parameters
                    .iter()
                    .filter(|(k, _)| !binding.parameters.contains_key(*k))
                    .filter_map(|(k, def)| def.default.as_ref().map(|d| (k, d))),
            )
            .map(|(k, v)| K8sEnvVar {
                name: crate::crd::param_env_name(k),
                value: Some(v.clone()),
                ..Default::default()
            })
            .collect();
        extra_env.push(K8sEnvVar {
            name: "OCULAR_UPLOADER_NAME".to_string(),
            value: Some(binding.name.clone()),
            ..Default::default()
        });

        let (mut c, vols, _) = build_user_container(&format!("uploader-{}", binding.name), &resolved.container, extra_env);
        let mut argv = vec!["--".to_string()];
        argv.extend(artifact_paths.iter().cloned());
        c.args = Some(argv);
        c.volume_mounts.get_or_insert_with(Vec::new).push(results_mount.clone());
        volumes.extend(vols);
        containers.push(c);
    }
    containers.push(receiver.clone());

    Job {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: pipeline.namespace(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(pipeline)]),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            active_deadline_seconds: Some(workload_timeout_seconds),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("Never".to_string()),
                    init_containers: Some(vec![receiver]),
                    containers,
                    volumes: Some(volumes),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

/// Service fronting the upload Job's init container with
/// `publish-not-ready-addresses` so the scan-side extractor sidecar can
/// reach it before the init container passes its readiness probe.
pub fn build_upload_service(pipeline: &Pipeline) -> Service {
    let labels = standard_labels(pipeline);
    Service {
        metadata: ObjectMeta {
            name: Some(upload_service_name(pipeline)),
            namespace: pipeline.namespace(),
            labels: Some(labels.clone()),
            annotations: Some(BTreeMap::from([(
                "service.kubernetes.io/publish-not-ready-addresses".to_string(),
                "true".to_string(),
            )])),
            owner_references: Some(vec![owner_reference(pipeline)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(labels),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: UPLOAD_SERVICE_PORT,
                ..Default::default()
            }]),
            publish_not_ready_addresses: Some(true),
            ..Default::default()
        }),
        status: None,
    }
}

#[instrument(skip(client, job), fields(name = job.metadata.name.as_deref().unwrap_or("")))]
pub async fn apply_job(client: &Client, namespace: &str, job: &Job) -> Result<()> {
    let api: Api<Job> = Api::namespaced(client.clone(), namespace);
    let name = job.metadata.name.clone().unwrap_or_default();
    api.patch(&name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(job))
        .await?;
    Ok(())
}

pub async fn apply_service(client: &Client, namespace: &str, service: &Service) -> Result<()> {
    let api: Api<Service> = Api::namespaced(client.clone(), namespace);
    let name = service.metadata.name.clone().unwrap_or_default();
    api.patch(&name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(service))
        .await?;
    Ok(())
}

/// Whether the upload Job's receiver init container has an observed-ready
/// Pod. Scan workloads with uploaders must not be created until this is
/// true, so the scan-side extractor sidecar always has somewhere to PUT.
pub async fn upload_receiver_ready(client: &Client, namespace: &str, pipeline: &Pipeline) -> Result<bool> {
    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let lp = ListParams::default().labels(&format!("job-name={}", upload_job_name(pipeline)));
    let list = pods.list(&lp).await.map_err(Error::KubeError)?;
    Ok(list.items.iter().any(|p| {
        p.status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .is_some_and(|phase| phase == "Running" || phase == "Succeeded")
    }))
}

pub async fn get_job(client: &Client, namespace: &str, name: &str) -> Result<Option<Job>> {
    let api: Api<Job> = Api::namespaced(client.clone(), namespace);
    match api.get(name).await {
        Ok(job) => Ok(Some(job)),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
        Err(e) => Err(Error::KubeError(e)),
    }
}

#[instrument(skip(client, pipeline), fields(name = %pipeline.name_any()))]
pub async fn delete_pipeline_workloads(client: &Client, pipeline: &Pipeline) -> Result<()> {
    let namespace = pipeline.namespace().unwrap_or_else(|| "default".to_string());
    let job_api: Api<Job> = Api::namespaced(client.clone(), &namespace);
    let service_api: Api<Service> = Api::namespaced(client.clone(), &namespace);

    let background = DeleteParams::background();
    for name in [upload_job_name(pipeline), scan_job_name(pipeline)] {
        match job_api.delete(&name, &background).await {
            Ok(_) => info!(job = %name, "deleted pipeline job"),
            Err(kube::Error::Api(e)) if e.code == 404 => {}
            Err(e) => return Err(Error::KubeError(e)),
        }
    }
    match service_api.delete(&upload_service_name(pipeline), &DeleteParams::default()).await {
        Ok(_) => info!("deleted upload service"),
        Err(kube::Error::Api(e)) if e.code == 404 => {}
        Err(e) => return Err(Error::KubeError(e)),
    }
    Ok(())
}

pub async fn get_secret(client: &Client, namespace: &str, name: &str) -> Result<Option<Secret>> {
    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    match api.get(name).await {
        Ok(s) => Ok(Some(s)),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
        Err(e) => Err(Error::KubeError(e)),
    }
}

pub fn config_map_volume(name: &str, config_map_name: &str, mount_path: &str) -> (Volume, VolumeMount) {
    (
        Volume {
            name: name.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: Some(config_map_name.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        },
        VolumeMount {
            name: name.to_string(),
            mount_path: mount_path.to_string(),
            read_only: Some(true),
            ..Default::default()
        },
    )
}

pub fn label_selector(labels: &BTreeMap<String, String>) -> LabelSelector {
    LabelSelector {
        match_labels: Some(labels.clone()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{PipelineSpec, Target};

    fn test_pipeline() -> Pipeline {
        Pipeline::new(
            "demo",
            PipelineSpec {
                target: Target {
                    downloader: "git".to_string(),
                    identifier: "https://example.com/repo.git".to_string(),
                    version: None,
                },
                profile_name: "default".to_string(),
                ttl_seconds_max_lifetime: None,
                job_ttl_seconds: None,
            },
        )
    }

    #[test]
    fn scan_job_name_is_suffixed() {
        let p = test_pipeline();
        assert_eq!(scan_job_name(&p), "demo-scan");
    }

    #[test]
    fn upload_service_carries_publish_not_ready_annotation() {
        let p = test_pipeline();
        let svc = build_upload_service(&p);
        assert_eq!(svc.spec.unwrap().publish_not_ready_addresses, Some(true));
    }

    #[test]
    fn downloader_container_carries_target_and_pipeline_env() {
        let p = test_pipeline();
        let downloader = UserContainer {
            image: "ghcr.io/ocular/git-downloader:latest".to_string(),
            pull_policy: None,
            command: None,
            args: None,
            env: vec![],
            secrets: vec![],
        };
        let profile = ProfileSpec {
            scanners: vec![],
            artifact_paths: vec!["out.json".to_string()],
            uploaders: vec![],
        };

        let job = build_scan_job(&p, &p.spec.target, &downloader, &profile, 900);
        let pod = job.spec.unwrap().template.spec.unwrap();
        let init = &pod.init_containers.unwrap()[0];
        let env = init.env.as_ref().unwrap();

        let value_of = |name: &str| {
            env.iter()
                .find(|e| e.name == name)
                .and_then(|e| e.value.clone())
        };
        assert_eq!(value_of("OCULAR_TARGET_DOWNLOADER").as_deref(), Some("git"));
        assert_eq!(
            value_of("OCULAR_TARGET_IDENTIFIER").as_deref(),
            Some("https://example.com/repo.git")
        );
        assert_eq!(value_of("OCULAR_TARGET_DIR").as_deref(), Some("/mnt/target"));
        assert_eq!(value_of("OCULAR_RESULTS_DIR").as_deref(), Some("/mnt/results"));
        assert_eq!(value_of("OCULAR_PROFILE_NAME").as_deref(), Some("default"));
        assert!(value_of("OCULAR_UPLOADER_HOST").unwrap().starts_with("http://demo-upload."));
        assert_eq!(init.working_dir.as_deref(), Some("/mnt/target"));
    }

    #[test]
    fn extractor_sidecar_gets_mode_and_paths_as_argv() {
        let p = test_pipeline();
        let downloader = UserContainer {
            image: "ghcr.io/ocular/git-downloader:latest".to_string(),
            pull_policy: None,
            command: None,
            args: None,
            env: vec![],
            secrets: vec![],
        };
        let profile = ProfileSpec {
            scanners: vec![],
            artifact_paths: vec!["out.json".to_string(), "report.sarif".to_string()],
            uploaders: vec![],
        };

        let job = build_scan_job(&p, &p.spec.target, &downloader, &profile, 900);
        let pod = job.spec.unwrap().template.spec.unwrap();
        let init_containers = pod.init_containers.unwrap();
        let extractor = init_containers.iter().find(|c| c.name == "extractor").unwrap();

        assert_eq!(
            extractor.args.as_deref(),
            Some(
                [
                    "ignore".to_string(),
                    "--".to_string(),
                    "out.json".to_string(),
                    "report.sarif".to_string(),
                ]
                .as_slice()
            )
        );
        assert_eq!(extractor.working_dir.as_deref(), Some("/mnt/results"));
        assert_eq!(extractor.restart_policy.as_deref(), Some("Always"));
        assert!(pod.containers.iter().all(|c| c.name != "extractor"));
    }

    #[test]
    fn uploader_container_gets_artifact_argv_and_name() {
        let p = test_pipeline();
        let binding = crate::crd::UploaderBinding {
            name: "s3".to_string(),
            parameters: Default::default(),
        };
        let resolved = UserContainerWithParameters {
            container: UserContainer {
                image: "ghcr.io/ocular/s3-uploader:latest".to_string(),
                pull_policy: None,
                command: None,
                args: None,
                env: vec![],
                secrets: vec![],
            },
            parameters: Default::default(),
        };

        let job = build_upload_job(&p, &[(binding, resolved)], &["out.json".to_string()], 900);
        let pod = job.spec.unwrap().template.spec.unwrap();
        let uploader = pod
            .containers
            .iter()
            .find(|c| c.name == "uploader-s3")
            .unwrap();

        assert_eq!(uploader.args.as_deref(), Some(["--".to_string(), "out.json".to_string()].as_slice()));
        assert!(uploader
            .env
            .as_ref()
            .unwrap()
            .iter()
            .any(|e| e.name == "OCULAR_UPLOADER_NAME" && e.value.as_deref() == Some("s3")));
    }
}
