//! Cluster Gateway: the only place that knows how to talk to the cluster.
//!
//! A thin façade over the control plane: typed object accessors, a context
//! manager that selects a named context (or the in-cluster context) and its
//! default namespace, and validity checks that required backing
//! ConfigMaps/Secrets exist before a context is used. Everything else in
//! this crate reaches the cluster through a `Gateway`.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::{api::Api, Client, Config};
use tracing::info;

use crate::error::{Error, Result};

/// One named cluster context: a resolved client plus its default
/// namespace. The operator holds a static table of these; federating
/// beyond this static list is out of scope.
#[derive(Clone)]
pub struct ClusterContext {
    pub name: String,
    pub client: Client,
    pub default_namespace: String,
    pub api_base_url: String,
}

/// A `name=kubeconfig-path` pair as accepted on the command line/env for
/// configuring additional cluster contexts.
#[derive(Clone, Debug)]
pub struct ContextSource {
    pub name: String,
    pub kubeconfig_path: Option<String>,
}

impl std::str::FromStr for ContextSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((name, path)) if !name.is_empty() => Ok(ContextSource {
                name: name.to_string(),
                kubeconfig_path: Some(path.to_string()),
            }),
            _ => Err(format!(
                "expected `name=kubeconfig-path`, got {s:?}"
            )),
        }
    }
}

/// Holds every configured cluster context and resolves the typed clients
/// the rest of the engine needs.
#[derive(Clone)]
pub struct Gateway {
    contexts: BTreeMap<String, ClusterContext>,
    default_context: String,
}

impl Gateway {
    /// Build a Gateway with a single in-cluster context named `"default"`.
    pub async fn in_cluster() -> Result<Self> {
        let config = Config::incluster().map_err(|e| Error::ConfigError(e.to_string()))?;
        let api_base_url = config.cluster_url.to_string();
        let client = Client::try_from(config).map_err(Error::KubeError)?;
        let default_namespace = default_namespace_in_cluster();
        let mut contexts = BTreeMap::new();
        contexts.insert(
            "default".to_string(),
            ClusterContext {
                name: "default".to_string(),
                client,
                default_namespace,
                api_base_url,
            },
        );
        Ok(Self {
            contexts,
            default_context: "default".to_string(),
        })
    }

    /// Build a Gateway from a static list of named kubeconfig-backed
    /// contexts, as produced by parsing `--context name=path` flags.
    pub async fn from_sources(sources: &[ContextSource], default_context: &str) -> Result<Self> {
        let mut contexts = BTreeMap::new();
        for source in sources {
            let (client, namespace, api_base_url) = match &source.kubeconfig_path {
                Some(path) => {
                    let kubeconfig = kube::config::Kubeconfig::read_from(path).map_err(|e| {
                        Error::ConfigError(format!(
                            "failed to read kubeconfig {path} for context {}: {e}",
                            source.name
                        ))
                    })?;
                    let options = kube::config::KubeConfigOptions {
                        context: Some(source.name.clone()),
                        ..Default::default()
                    };
                    let config = Config::from_custom_kubeconfig(kubeconfig, &options)
                        .await
                        .map_err(|e| Error::ConfigError(e.to_string()))?;
                    let namespace = config.default_namespace.clone();
                    let api_base_url = config.cluster_url.to_string();
                    let client = Client::try_from(config).map_err(Error::KubeError)?;
                    (client, namespace, api_base_url)
                }
                None => {
                    let config = Config::incluster().map_err(|e| Error::ConfigError(e.to_string()))?;
                    let api_base_url = config.cluster_url.to_string();
                    let client = Client::try_from(config).map_err(Error::KubeError)?;
                    (client, default_namespace_in_cluster(), api_base_url)
                }
            };
            info!(context = %source.name, "registered cluster context");
            contexts.insert(
                source.name.clone(),
                ClusterContext {
                    name: source.name.clone(),
                    client,
                    default_namespace: namespace,
                    api_base_url,
                },
            );
        }

        if !contexts.contains_key(default_context) {
            return Err(Error::ConfigError(format!(
                "default context {default_context:?} was not among the configured contexts"
            )));
        }

        Ok(Self {
            contexts,
            default_context: default_context.to_string(),
        })
    }

    /// Resolve a named context, falling back to the default context when
    /// `name` is `None`.
    pub fn context(&self, name: Option<&str>) -> Result<&ClusterContext> {
        let key = name.unwrap_or(&self.default_context);
        self.contexts
            .get(key)
            .ok_or_else(|| Error::NotFound(format!("cluster context {key:?} not configured")))
    }

    pub fn default_context(&self) -> &ClusterContext {
        self.contexts
            .get(&self.default_context)
            .expect("default context is always present")
    }

    pub fn contexts(&self) -> impl Iterator<Item = &ClusterContext> {
        self.contexts.values()
    }

    /// Verify that a context's backing ConfigMap and Secret stores are
    /// reachable before it is handed to a reconciler. Called once at
    /// startup per configured context.
    pub async fn check_context_validity(&self, name: &str) -> Result<()> {
        let ctx = self.context(Some(name))?;
        let configmaps: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), &ctx.default_namespace);
        let secrets: Api<Secret> = Api::namespaced(ctx.client.clone(), &ctx.default_namespace);

        configmaps
            .list(&Default::default())
            .await
            .map_err(Error::KubeError)?;
        secrets
            .list(&Default::default())
            .await
            .map_err(Error::KubeError)?;
        Ok(())
    }
}

fn default_namespace_in_cluster() -> String {
    std::fs::read_to_string("/var/run/secrets/kubernetes.io/serviceaccount/namespace")
        .unwrap_or_else(|_| "default".to_string())
        .trim()
        .to_string()
}
