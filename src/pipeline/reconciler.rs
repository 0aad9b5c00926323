//! Pipeline reconciler: download → scan → extract → upload.
//!
//! `reconcile()` uses the kube-runtime `finalizer()` helper to route to
//! `apply_pipeline`/`cleanup_pipeline`, `error_policy()` consults
//! `Error::is_retriable()`, and status patches go through `Patch::Merge`
//! against the status subresource.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{finalizer, Event as FinalizerEvent};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{
    api::{Api, Patch, PatchParams},
    Client, ResourceExt,
};
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::controller::conditions::{not_ready_condition, ready_condition, set_condition};
use crate::crd::{Pipeline, PipelinePhase, PipelineStatus, StageStatus};
use crate::error::{Error, Result};
use crate::gateway::Gateway;
use crate::pipeline::resources;
use crate::validation;

pub const PIPELINE_FINALIZER: &str = "pipeline.ocular.crashoverride.run/finalizer";

pub const DEFAULT_WORKLOAD_TIMEOUT_SECONDS: i64 = 45 * 60;

#[derive(Clone)]
pub struct PipelineState {
    pub gateway: Arc<Gateway>,
}

#[instrument(skip(ctx, pipeline), fields(name = %pipeline.name_any()))]
async fn reconcile(pipeline: Arc<Pipeline>, ctx: Arc<PipelineState>) -> Result<Action> {
    let client = ctx.gateway.default_context().client.clone();
    let namespace = pipeline.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<Pipeline> = Api::namespaced(client.clone(), &namespace);

    #[cfg(feature = "metrics")]
    let started = std::time::Instant::now();

    let result = finalizer(&api, PIPELINE_FINALIZER, pipeline, |event| async {
        match event {
            FinalizerEvent::Apply(p) => apply_pipeline(&client, &api, &p).await,
            FinalizerEvent::Cleanup(p) => cleanup_pipeline(&client, &p).await,
        }
    })
    .await
    .map_err(Error::from);

    #[cfg(feature = "metrics")]
    {
        crate::controller::metrics::observe_reconcile_duration_seconds(
            "pipeline",
            started.elapsed().as_secs_f64(),
        );
        if let Err(e) = &result {
            crate::controller::metrics::inc_reconcile_error("pipeline", e.kind().code());
        }
    }

    result
}

async fn apply_pipeline(client: &Client, api: &Api<Pipeline>, pipeline: &Pipeline) -> Result<Action> {
    let namespace = pipeline.namespace().unwrap_or_else(|| "default".to_string());
    let name = pipeline.name_any();

    if let Some(max_lifetime) = pipeline.spec.ttl_seconds_max_lifetime {
        if let Some(created) = pipeline.metadata.creation_timestamp.as_ref() {
            let age = Utc::now().signed_duration_since(created.0).num_seconds();
            if age > max_lifetime {
                info!(%name, age, max_lifetime, "pipeline exceeded max lifetime, deleting");
                api.delete(&name, &Default::default()).await.ok();
                return Ok(Action::await_change());
            }
        }
    }

    let phase = pipeline.status.as_ref().map(|s| s.phase).unwrap_or_default();

    if phase.is_terminal() {
        return handle_terminal(client, pipeline).await;
    }

    match phase {
        PipelinePhase::Pending => start_download(client, api, pipeline).await,
        PipelinePhase::Downloading => advance_to_scanning(client, api, pipeline).await,
        PipelinePhase::Scanning => advance_to_uploading(client, api, pipeline).await,
        PipelinePhase::Uploading => advance_to_completed(client, api, pipeline).await,
        _ => Ok(Action::requeue(Duration::from_secs(30))),
    }
}

/// Validate target/profile, bring up the upload workload (if the profile
/// has uploaders) and wait for its receiver to be reachable, then kick off
/// the scan Job. The scan-side extractor sidecar starts alongside the
/// scanners and has nowhere to PUT artifacts until the upload Service's
/// receiver is up, so the scan Job must not be created first.
async fn start_download(client: &Client, api: &Api<Pipeline>, pipeline: &Pipeline) -> Result<Action> {
    let namespace = pipeline.namespace().unwrap_or_else(|| "default".to_string());
    let name = pipeline.name_any();

    if let Err(e) = validation::validate_target(client, &namespace, &pipeline.spec.target).await {
        return fail_pipeline(client, api, pipeline, "download", &e.to_string()).await;
    }

    let profiles: Api<crate::crd::Profile> = Api::namespaced(client.clone(), &namespace);
    let profile = match profiles.get(&pipeline.spec.profile_name).await {
        Ok(p) => p,
        Err(kube::Error::Api(e)) if e.code == 404 => {
            return fail_pipeline(
                client,
                api,
                pipeline,
                "download",
                &format!("profile {:?} not found", pipeline.spec.profile_name),
            )
            .await;
        }
        Err(e) => return Err(Error::KubeError(e)),
    };

    if let Err(e) = validation::validate_profile(client, &namespace, &profile.spec).await {
        return fail_pipeline(client, api, pipeline, "download", &e.to_string()).await;
    }

    let upload_status = if profile.spec.uploaders.is_empty() {
        StageStatus::NotRan
    } else {
        resources::apply_service(client, &namespace, &resources::build_upload_service(pipeline)).await?;

        let mut resolved = Vec::new();
        for binding in &profile.spec.uploaders {
            let uploader = validation::resolve_uploader(client, &namespace, binding).await?;
            resolved.push((binding.clone(), uploader));
        }
        let upload_job = resources::build_upload_job(
            pipeline,
            &resolved,
            &profile.spec.artifact_paths,
            DEFAULT_WORKLOAD_TIMEOUT_SECONDS,
        );
        resources::apply_job(client, &namespace, &upload_job).await?;

        if !resources::upload_receiver_ready(client, &namespace, pipeline).await? {
            info!(%name, "waiting for upload receiver to become ready before starting the scan job");
            return Ok(Action::requeue(Duration::from_secs(5)));
        }
        StageStatus::Running
    };

    let downloader = validation::resolve_downloader(client, &namespace, &pipeline.spec.target).await?;

    let timeout = DEFAULT_WORKLOAD_TIMEOUT_SECONDS;
    let job = resources::build_scan_job(pipeline, &pipeline.spec.target, &downloader, &profile.spec, timeout);
    resources::apply_job(client, &namespace, &job).await?;

    #[cfg(feature = "metrics")]
    {
        crate::controller::metrics::inc_scan_pods_created();
        if upload_status != StageStatus::NotRan {
            crate::controller::metrics::inc_upload_pods_created();
        }
        crate::controller::metrics::inc_pipelines_running();
    }

    let mut status = pipeline.status.clone().unwrap_or_default();
    status.phase = PipelinePhase::Downloading;
    status.scan_status = StageStatus::Running;
    status.upload_status = upload_status;
    status.start_time.get_or_insert_with(|| Utc::now().to_rfc3339());
    set_condition(&mut status.conditions, "Progressing", "True", "Downloading", "scan job created");
    patch_status(client, &namespace, &name, &status).await?;

    Ok(Action::requeue(Duration::from_secs(15)))
}

/// Downloading is really "scan job running"; we move phase label to
/// Scanning once the scan Job's containers have all started (init
/// container finished).
async fn advance_to_scanning(client: &Client, api: &Api<Pipeline>, pipeline: &Pipeline) -> Result<Action> {
    let namespace = pipeline.namespace().unwrap_or_else(|| "default".to_string());
    let name = pipeline.name_any();
    let job_name = resources::scan_job_name(pipeline);

    let job = match resources::get_job(client, &namespace, &job_name).await? {
        Some(j) => j,
        None => return fail_pipeline(client, api, pipeline, "download", "scan job disappeared").await,
    };

    let jstatus = job.status.clone().unwrap_or_default();
    if jstatus.failed.unwrap_or(0) > 0 {
        return fail_pipeline(client, api, pipeline, "scan", "scan job failed").await;
    }
    if jstatus.succeeded.unwrap_or(0) > 0 {
        let mut status = pipeline.status.clone().unwrap_or_default();
        status.phase = PipelinePhase::Scanning;
        status.scan_status = StageStatus::Succeeded;
        patch_status(client, &namespace, &name, &status).await?;
        return Ok(Action::requeue(Duration::from_secs(5)));
    }
    if jstatus.active.unwrap_or(0) > 0 {
        let mut status = pipeline.status.clone().unwrap_or_default();
        status.phase = PipelinePhase::Scanning;
        patch_status(client, &namespace, &name, &status).await?;
    }
    Ok(Action::requeue(Duration::from_secs(10)))
}

/// The upload workload (Service + Job) was already created by
/// `start_download` before the scan Job, so there's nothing left to build
/// here — just wait for the scan Job to succeed and flip the phase label.
async fn advance_to_uploading(client: &Client, api: &Api<Pipeline>, pipeline: &Pipeline) -> Result<Action> {
    let namespace = pipeline.namespace().unwrap_or_else(|| "default".to_string());
    let name = pipeline.name_any();
    let job_name = resources::scan_job_name(pipeline);

    let job = match resources::get_job(client, &namespace, &job_name).await? {
        Some(j) => j,
        None => return fail_pipeline(client, api, pipeline, "scan", "scan job disappeared").await,
    };
    let jstatus = job.status.clone().unwrap_or_default();
    if jstatus.failed.unwrap_or(0) > 0 {
        return fail_pipeline(client, api, pipeline, "scan", "scan job failed").await;
    }
    if jstatus.succeeded.unwrap_or(0) == 0 {
        return Ok(Action::requeue(Duration::from_secs(10)));
    }

    let mut status = pipeline.status.clone().unwrap_or_default();
    status.phase = PipelinePhase::Uploading;
    if status.upload_status != StageStatus::NotRan {
        status.upload_status = StageStatus::Running;
    }
    patch_status(client, &namespace, &name, &status).await?;
    Ok(Action::requeue(Duration::from_secs(5)))
}

async fn advance_to_completed(client: &Client, api: &Api<Pipeline>, pipeline: &Pipeline) -> Result<Action> {
    let namespace = pipeline.namespace().unwrap_or_else(|| "default".to_string());
    let name = pipeline.name_any();

    if pipeline.status.as_ref().map(|s| s.upload_status) == Some(StageStatus::NotRan) {
        return complete_pipeline(client, &namespace, &name, pipeline).await;
    }

    let job_name = resources::upload_job_name(pipeline);
    let job = match resources::get_job(client, &namespace, &job_name).await? {
        Some(j) => j,
        None => return fail_pipeline(client, api, pipeline, "upload", "upload job disappeared").await,
    };
    let jstatus = job.status.clone().unwrap_or_default();
    if jstatus.failed.unwrap_or(0) > 0 {
        return fail_pipeline(client, api, pipeline, "upload", "upload job failed").await;
    }
    if jstatus.succeeded.unwrap_or(0) > 0 {
        return complete_pipeline(client, &namespace, &name, pipeline).await;
    }
    Ok(Action::requeue(Duration::from_secs(10)))
}

async fn complete_pipeline(client: &Client, namespace: &str, name: &str, pipeline: &Pipeline) -> Result<Action> {
    let mut status = pipeline.status.clone().unwrap_or_default();
    status.phase = PipelinePhase::Completed;
    status.upload_status = if status.upload_status == StageStatus::NotRan {
        StageStatus::NotRan
    } else {
        StageStatus::Succeeded
    };
    let completed_at = Utc::now();
    status.completion_time = Some(completed_at.to_rfc3339());
    status.conditions.retain(|c| c.type_ != "Progressing");
    status.conditions.push(ready_condition("Completed", "pipeline completed successfully"));
    patch_status(client, namespace, name, &status).await?;

    #[cfg(feature = "metrics")]
    record_terminal_metrics(&status, completed_at);

    if let Some(ttl) = pipeline.spec.job_ttl_seconds {
        return Ok(Action::requeue(Duration::from_secs(ttl.max(0) as u64)));
    }
    Ok(Action::await_change())
}

#[cfg(feature = "metrics")]
fn record_terminal_metrics(status: &PipelineStatus, completed_at: chrono::DateTime<Utc>) {
    crate::controller::metrics::inc_pipelines_completed();
    crate::controller::metrics::dec_pipelines_running();
    if let Some(started) = status
        .start_time
        .as_ref()
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
    {
        let elapsed = completed_at.signed_duration_since(started.with_timezone(&Utc));
        crate::controller::metrics::observe_pipeline_duration_seconds(elapsed.num_milliseconds() as f64 / 1000.0);
    }
}

async fn fail_pipeline(client: &Client, _api: &Api<Pipeline>, pipeline: &Pipeline, stage: &str, message: &str) -> Result<Action> {
    let namespace = pipeline.namespace().unwrap_or_else(|| "default".to_string());
    let name = pipeline.name_any();
    warn!(%name, stage, message, "pipeline failed");

    let mut status = pipeline.status.clone().unwrap_or_default();
    status.phase = PipelinePhase::Failed;
    status.failed_stage = Some(stage.to_string());
    status.message = Some(message.to_string());
    let completed_at = Utc::now();
    status.completion_time = Some(completed_at.to_rfc3339());
    status.conditions.retain(|c| c.type_ != "Progressing");
    status.conditions.push(not_ready_condition("Failed", message));
    patch_status(client, &namespace, &name, &status).await?;

    #[cfg(feature = "metrics")]
    if pipeline.status.as_ref().map(|s| s.phase) == Some(PipelinePhase::Downloading)
        || pipeline.status.as_ref().map(|s| s.phase) == Some(PipelinePhase::Scanning)
        || pipeline.status.as_ref().map(|s| s.phase) == Some(PipelinePhase::Uploading)
    {
        record_terminal_metrics(&status, completed_at);
    }

    Ok(Action::await_change())
}

async fn handle_terminal(client: &Client, pipeline: &Pipeline) -> Result<Action> {
    let namespace = pipeline.namespace().unwrap_or_else(|| "default".to_string());
    if let Some(ttl) = pipeline.spec.job_ttl_seconds {
        if let Some(completion) = pipeline.status.as_ref().and_then(|s| s.completion_time.as_ref()) {
            if let Ok(completed_at) = chrono::DateTime::parse_from_rfc3339(completion) {
                let age = Utc::now().signed_duration_since(completed_at.with_timezone(&Utc)).num_seconds();
                if age > ttl {
                    let api: Api<Pipeline> = Api::namespaced(client.clone(), &namespace);
                    api.delete(&pipeline.name_any(), &Default::default()).await.ok();
                }
            }
        }
    }
    Ok(Action::await_change())
}

async fn cleanup_pipeline(client: &Client, pipeline: &Pipeline) -> Result<Action> {
    resources::delete_pipeline_workloads(client, pipeline).await?;
    Ok(Action::await_change())
}

async fn patch_status(client: &Client, namespace: &str, name: &str, status: &PipelineStatus) -> Result<()> {
    let api: Api<Pipeline> = Api::namespaced(client.clone(), namespace);
    let patch = json!({ "status": status });
    api.patch_status(name, &PatchParams::apply("ocular-operator"), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

fn error_policy(_pipeline: Arc<Pipeline>, error: &Error, _ctx: Arc<PipelineState>) -> Action {
    error!(%error, "pipeline reconcile error");
    if error.is_retriable() {
        Action::requeue(Duration::from_secs(15))
    } else {
        Action::requeue(Duration::from_secs(300))
    }
}

pub async fn run(gateway: Arc<Gateway>) {
    let client = gateway.default_context().client.clone();
    let api: Api<Pipeline> = Api::all(client.clone());
    let ctx = Arc::new(PipelineState { gateway });

    Controller::new(api, WatcherConfig::default())
        .owns::<k8s_openapi::api::batch::v1::Job>(Api::all(client.clone()), WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok(o) => info!(?o, "reconciled pipeline"),
                Err(e) => error!(%e, "pipeline reconcile failed"),
            }
        })
        .await;
}
