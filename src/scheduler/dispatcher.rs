//! Per-FIFO dispatch: one record at a time, create the resource it
//! describes, then sleep the dispatch interval before the next one.

use std::sync::Arc;
use std::time::Duration;

use kube::api::{Api, PostParams};
use kube::{Client, ResourceExt};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::warn;
use uuid::Uuid;

use crate::crd::{ParameterizedObjectReference, Pipeline, Search, Target};
use crate::error::{Error, Result};
use crate::search::resources::owner_reference;

/// Label applied to every Pipeline the dispatcher creates from
/// `pipeline-fifo`, naming the parent Search's UID.
const SEARCH_UID_LABEL: &str = "search";

pub async fn run_pipeline_dispatcher(
    client: Client,
    namespace: String,
    search: Arc<Search>,
    mut rx: mpsc::Receiver<Value>,
    interval: Duration,
    mut cancel: watch::Receiver<bool>,
) {
    let api: Api<Pipeline> = Api::namespaced(client, &namespace);
    loop {
        tokio::select! {
            _ = cancel.changed() => {
                if *cancel.borrow() {
                    return;
                }
            }
            record = rx.recv() => {
                let Some(value) = record else { return };
                match serde_json::from_value::<Target>(value) {
                    Ok(target) => {
                        if let Err(e) = dispatch_pipeline(&api, &search, target).await {
                            warn!(error = %e, "failed to create pipeline from pipeline-fifo record");
                        }
                        tokio::time::sleep(interval).await;
                    }
                    Err(e) => warn!(error = %e, "invalid target record on pipeline-fifo"),
                }
            }
        }
    }
}

pub async fn run_search_dispatcher(
    client: Client,
    namespace: String,
    search: Arc<Search>,
    mut rx: mpsc::Receiver<Value>,
    interval: Duration,
    mut cancel: watch::Receiver<bool>,
) {
    let api: Api<Search> = Api::namespaced(client, &namespace);
    loop {
        tokio::select! {
            _ = cancel.changed() => {
                if *cancel.borrow() {
                    return;
                }
            }
            record = rx.recv() => {
                let Some(value) = record else { return };
                match serde_json::from_value::<ParameterizedObjectReference>(value) {
                    Ok(crawler_ref) => {
                        if let Err(e) = dispatch_search(&api, &search, crawler_ref).await {
                            warn!(error = %e, "failed to create search from search-fifo record");
                        }
                        tokio::time::sleep(interval).await;
                    }
                    Err(e) => warn!(error = %e, "invalid crawler reference on search-fifo"),
                }
            }
        }
    }
}

async fn dispatch_pipeline(api: &Api<Pipeline>, search: &Search, target: Target) -> Result<()> {
    let mut spec = search.spec.pipeline_template.clone().ok_or_else(|| {
        Error::ValidationError(
            "search has no pipelineTemplate, cannot dispatch pipeline-fifo records".to_string(),
        )
    })?;
    spec.target = target;

    let mut pipeline = Pipeline::new(&format!("{}-{}", search.name_any(), Uuid::new_v4()), spec);
    pipeline.metadata.namespace = search.namespace();
    pipeline.metadata.owner_references = Some(vec![owner_reference(search)]);
    pipeline.metadata.labels = Some(
        [(SEARCH_UID_LABEL.to_string(), search.uid().unwrap_or_default())]
            .into_iter()
            .collect(),
    );

    api.create(&PostParams::default(), &pipeline)
        .await
        .map_err(Error::KubeError)?;
    Ok(())
}

/// Children dispatched from `search-fifo` are siblings of the parent
/// Search, not owned descendants: they carry the parent's UID as a label
/// for lineage tracking, but no owner reference, so deleting the parent
/// does not cascade-delete them.
async fn dispatch_search(
    api: &Api<Search>,
    search: &Search,
    crawler_ref: ParameterizedObjectReference,
) -> Result<()> {
    let mut spec = search.spec.clone();
    spec.crawler = crawler_ref;

    let mut child = Search::new(&format!("{}-{}", search.name_any(), Uuid::new_v4()), spec);
    child.metadata.namespace = search.namespace();
    child.metadata.labels = Some(
        [(SEARCH_UID_LABEL.to_string(), search.uid().unwrap_or_default())]
            .into_iter()
            .collect(),
    );

    api.create(&PostParams::default(), &child)
        .await
        .map_err(Error::KubeError)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ParameterizedObjectReference, SearchSpec};
    use kube::{Client, Config};

    /// A `Client` configured against an address nothing listens on. Every
    /// test here exercises a code path that returns before the client is
    /// ever used to make a request.
    fn dead_client() -> Client {
        let config = Config::new("http://127.0.0.1:1".parse().unwrap());
        Client::try_from(config).unwrap()
    }

    fn bare_search(name: &str, pipeline_template: Option<crate::crd::PipelineSpec>) -> Search {
        let spec = SearchSpec {
            crawler: ParameterizedObjectReference {
                name: "my-crawler".to_string(),
                parameters: Default::default(),
            },
            pipeline_template,
            interval_seconds: None,
            service_account_name: None,
            ttl_seconds_max_lifetime: None,
        };
        let mut search = Search::new(name, spec);
        search.metadata.namespace = Some("default".to_string());
        search.metadata.uid = Some("11111111-1111-1111-1111-111111111111".to_string());
        search
    }

    #[tokio::test]
    async fn dispatch_pipeline_without_template_is_rejected() {
        let api: Api<Pipeline> = Api::namespaced(dead_client(), "default");
        let search = bare_search("crawl", None);
        let target = Target {
            downloader: "git".to_string(),
            identifier: "https://example.com/repo".to_string(),
            version: None,
        };

        let err = dispatch_pipeline(&api, &search, target).await.unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
    }
}
