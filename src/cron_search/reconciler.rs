//! CronSearch reconciler: periodically creates a Search from
//! `searchTemplate` on the configured cron schedule.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use futures::StreamExt;
use kube::runtime::controller::Action;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{
    api::{Api, Patch, PatchParams, PostParams},
    Client, ResourceExt,
};
use serde_json::json;
use tracing::{error, info, warn};

use crate::crd::{CronSearch, CronSearchStatus, Search};
use crate::error::{Error, Result};
use crate::gateway::Gateway;

#[derive(Clone)]
pub struct CronSearchState {
    pub gateway: Arc<Gateway>,
}

fn search_name(cron_search: &CronSearch, fire_time: i64) -> String {
    format!("{}-{}", cron_search.name_any(), fire_time)
}

async fn reconcile(cron_search: Arc<CronSearch>, ctx: Arc<CronSearchState>) -> Result<Action> {
    #[cfg(feature = "metrics")]
    let started = std::time::Instant::now();

    let result = reconcile_inner(cron_search, ctx).await;

    #[cfg(feature = "metrics")]
    {
        crate::controller::metrics::observe_reconcile_duration_seconds(
            "cronsearch",
            started.elapsed().as_secs_f64(),
        );
        if let Err(e) = &result {
            crate::controller::metrics::inc_reconcile_error("cronsearch", e.kind().code());
        }
    }

    result
}

async fn reconcile_inner(cron_search: Arc<CronSearch>, ctx: Arc<CronSearchState>) -> Result<Action> {
    let client = ctx.gateway.default_context().client.clone();
    let namespace = cron_search.namespace().unwrap_or_else(|| "default".to_string());
    let name = cron_search.name_any();

    if cron_search.spec.suspend {
        return Ok(Action::requeue(Duration::from_secs(300)));
    }

    let schedule = match Schedule::from_str(&cron_search.spec.schedule) {
        Ok(s) => s,
        Err(e) => {
            warn!(%name, error = %e, "invalid cron schedule");
            return Ok(Action::requeue(Duration::from_secs(300)));
        }
    };

    let now = Utc::now();
    let last_schedule = cron_search
        .status
        .as_ref()
        .and_then(|s| s.last_schedule_time.as_ref())
        .and_then(|t| chrono::DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc));

    let after = last_schedule.unwrap_or_else(|| {
        cron_search
            .metadata
            .creation_timestamp
            .as_ref()
            .map(|t| t.0)
            .unwrap_or(now)
    });

    let next_fire = schedule.after(&after).next();

    if let Some(fire_time) = next_fire {
        if fire_time <= now {
            let deadline_ok = cron_search
                .spec
                .starting_deadline_seconds
                .map(|d| (now - fire_time).num_seconds() <= d)
                .unwrap_or(true);

            if deadline_ok {
                let search_api: Api<Search> = Api::namespaced(client.clone(), &namespace);
                let mut search = Search::new(
                    &search_name(&cron_search, fire_time.timestamp()),
                    cron_search.spec.search_template.clone(),
                );
                search.metadata.owner_references = Some(vec![owner_reference(&cron_search)]);

                match search_api.create(&PostParams::default(), &search).await {
                    Ok(created) => {
                        let mut status = cron_search.status.clone().unwrap_or_default();
                        status.last_schedule_time = Some(fire_time.to_rfc3339());
                        status.last_created_search = Some(created.name_any());
                        patch_status(&client, &namespace, &name, &status).await?;
                    }
                    Err(kube::Error::Api(e)) if e.code == 409 => {
                        let mut status = cron_search.status.clone().unwrap_or_default();
                        status.last_schedule_time = Some(fire_time.to_rfc3339());
                        patch_status(&client, &namespace, &name, &status).await?;
                    }
                    Err(e) => return Err(Error::KubeError(e)),
                }
            }
        }
    }

    let next_after_now = schedule.after(&now).next();
    let delay = next_after_now
        .map(|t| (t - now).num_seconds().max(1) as u64)
        .unwrap_or(300)
        .min(300);
    Ok(Action::requeue(Duration::from_secs(delay)))
}

fn owner_reference(cron_search: &CronSearch) -> k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference {
    use kube::Resource;
    k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference {
        api_version: CronSearch::api_version(&()).to_string(),
        kind: CronSearch::kind(&()).to_string(),
        name: cron_search.name_any(),
        uid: cron_search.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

async fn patch_status(client: &Client, namespace: &str, name: &str, status: &CronSearchStatus) -> Result<()> {
    let api: Api<CronSearch> = Api::namespaced(client.clone(), namespace);
    let patch = json!({ "status": status });
    api.patch_status(name, &PatchParams::apply("ocular-operator"), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

fn error_policy(_cron_search: Arc<CronSearch>, error: &Error, _ctx: Arc<CronSearchState>) -> Action {
    error!(%error, "cron search reconcile error");
    Action::requeue(Duration::from_secs(60))
}

pub async fn run(gateway: Arc<Gateway>) {
    let client = gateway.default_context().client.clone();
    let api: Api<CronSearch> = Api::all(client);
    let ctx = Arc::new(CronSearchState { gateway });

    Controller::new(api, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok(o) => info!(?o, "reconciled cron search"),
                Err(e) => error!(%e, "cron search reconcile failed"),
            }
        })
        .await;
}
