//! Search reconciler: runs a crawler+scheduler-sidecar Pod until the
//! crawler container exits, at which point the sidecar drains its FIFOs
//! and exits too, completing the Pod.

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
use tracing::{error, info, warn};

use crate::controller::conditions::{not_ready_condition, ready_condition};
use crate::crd::{Search, SearchPhase, SearchStatus};
use crate::error::{Error, Result};
use crate::gateway::Gateway;
use crate::search::resources;
use crate::validation;

pub const SEARCH_FINALIZER: &str = "search.ocular.crashoverride.run/finalizer";

#[derive(Clone)]
pub struct SearchState {
    pub gateway: Arc<Gateway>,
}

async fn reconcile(search: Arc<Search>, ctx: Arc<SearchState>) -> Result<Action> {
    let cluster_ctx = ctx.gateway.default_context();
    let client = cluster_ctx.client.clone();
    let context_name = cluster_ctx.name.clone();
    let api_base_url = cluster_ctx.api_base_url.clone();
    let namespace = search.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<Search> = Api::namespaced(client.clone(), &namespace);

    #[cfg(feature = "metrics")]
    let started = std::time::Instant::now();

    let result = finalizer(&api, SEARCH_FINALIZER, search, |event| async {
        match event {
            FinalizerEvent::Apply(s) => {
                apply_search(&client, &api, &s, &context_name, &api_base_url).await
            }
            FinalizerEvent::Cleanup(s) => cleanup_search(&client, &s).await,
        }
    })
    .await
    .map_err(Error::from);

    #[cfg(feature = "metrics")]
    {
        crate::controller::metrics::observe_reconcile_duration_seconds(
            "search",
            started.elapsed().as_secs_f64(),
        );
        if let Err(e) = &result {
            crate::controller::metrics::inc_reconcile_error("search", e.kind().code());
        }
    }

    result
}

async fn apply_search(
    client: &Client,
    api: &Api<Search>,
    search: &Search,
    context_name: &str,
    api_base_url: &str,
) -> Result<Action> {
    let namespace = search.namespace().unwrap_or_else(|| "default".to_string());
    let name = search.name_any();

    if let Some(max_lifetime) = search.spec.ttl_seconds_max_lifetime {
        if let Some(created) = search.metadata.creation_timestamp.as_ref() {
            let age = Utc::now().signed_duration_since(created.0).num_seconds();
            if age > max_lifetime {
                info!(%name, age, max_lifetime, "search exceeded max lifetime, deleting");
                api.delete(&name, &Default::default()).await.ok();
                return Ok(Action::await_change());
            }
        }
    }

    let phase = search.status.as_ref().map(|s| s.phase).unwrap_or_default();
    if matches!(phase, SearchPhase::Completed | SearchPhase::Failed | SearchPhase::Cancelled) {
        return Ok(Action::await_change());
    }

    if phase == SearchPhase::Pending {
        return start_search(client, search, &namespace, &name, context_name, api_base_url).await;
    }

    let pod = match resources::get_pod(client, &namespace, &resources::pod_name(search)).await? {
        Some(p) => p,
        None => return fail_search(client, search, &namespace, &name, "search pod disappeared").await,
    };

    let phase_str = pod.status.as_ref().and_then(|s| s.phase.clone()).unwrap_or_default();
    match phase_str.as_str() {
        "Succeeded" => complete_search(client, &namespace, &name, search).await,
        "Failed" => fail_search(client, search, &namespace, &name, "search pod failed").await,
        _ => Ok(Action::requeue(Duration::from_secs(15))),
    }
}

async fn start_search(
    client: &Client,
    search: &Search,
    namespace: &str,
    name: &str,
    context_name: &str,
    api_base_url: &str,
) -> Result<Action> {
    let crawler = match validation::resolve_crawler(client, namespace, &search.spec.crawler).await {
        Ok(c) => c,
        Err(e) => return fail_search(client, search, namespace, name, &e.to_string()).await,
    };

    let service_account = match &search.spec.service_account_name {
        Some(sa) => sa.clone(),
        None => resources::ensure_disposable_service_account(client, search).await?,
    };

    let pod = resources::build_pod(
        search,
        &search.spec.crawler,
        &crawler,
        &service_account,
        context_name,
        api_base_url,
    );
    resources::apply_pod(client, namespace, &pod).await?;

    let mut status = search.status.clone().unwrap_or_default();
    status.phase = SearchPhase::Running;
    status.start_time.get_or_insert_with(|| Utc::now().to_rfc3339());
    patch_status(client, namespace, name, &status).await?;
    Ok(Action::requeue(Duration::from_secs(15)))
}

async fn complete_search(client: &Client, namespace: &str, name: &str, search: &Search) -> Result<Action> {
    let mut status = search.status.clone().unwrap_or_default();
    status.phase = SearchPhase::Completed;
    status.completion_time = Some(Utc::now().to_rfc3339());
    status.conditions.push(ready_condition("Completed", "search completed"));
    patch_status(client, namespace, name, &status).await?;
    Ok(Action::await_change())
}

async fn fail_search(client: &Client, search: &Search, namespace: &str, name: &str, message: &str) -> Result<Action> {
    warn!(%name, message, "search failed");
    let mut status = search.status.clone().unwrap_or_default();
    status.phase = SearchPhase::Failed;
    status.message = Some(message.to_string());
    status.completion_time = Some(Utc::now().to_rfc3339());
    status.conditions.push(not_ready_condition("Failed", message));
    patch_status(client, namespace, name, &status).await?;
    Ok(Action::await_change())
}

async fn cleanup_search(client: &Client, search: &Search) -> Result<Action> {
    resources::delete_search_workload(client, search).await?;
    Ok(Action::await_change())
}

async fn patch_status(client: &Client, namespace: &str, name: &str, status: &SearchStatus) -> Result<()> {
    let api: Api<Search> = Api::namespaced(client.clone(), namespace);
    let patch = json!({ "status": status });
    api.patch_status(name, &PatchParams::apply("ocular-operator"), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

fn error_policy(_search: Arc<Search>, error: &Error, _ctx: Arc<SearchState>) -> Action {
    error!(%error, "search reconcile error");
    if error.is_retriable() {
        Action::requeue(Duration::from_secs(15))
    } else {
        Action::requeue(Duration::from_secs(300))
    }
}

pub async fn run(gateway: Arc<Gateway>) {
    let client = gateway.default_context().client.clone();
    let api: Api<Search> = Api::all(client.clone());
    let ctx = Arc::new(SearchState { gateway });

    Controller::new(api, WatcherConfig::default())
        .owns::<k8s_openapi::api::core::v1::Pod>(Api::all(client.clone()), WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok(o) => info!(?o, "reconciled search"),
                Err(e) => error!(%e, "search reconcile failed"),
            }
        })
        .await;
}
