//! # Initialization
//!
//! Operator startup: rustls setup, tracing, probe server and Kubernetes
//! client setup.

use crate::config::{ControllerConfig, ServerConfig};
use crate::controller::server::{start_server, ServerState};
use crate::controller::{KubeStore, ServiceController};
use crate::crd::ZooKeeperService;
use crate::provider::VaultConnector;
use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Secret;
use kube::{api::Api, api::ListParams, Client};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Everything the watch loop needs
pub struct InitializationResult {
    pub client: Client,
    /// Watched `ZooKeeperService` documents
    pub documents: Api<ZooKeeperService>,
    /// Secrets owned by the documents
    pub secrets: Api<Secret>,
    pub controller: Arc<ServiceController<KubeStore>>,
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("controller", &self.controller)
            .field("server_state", &self.server_state)
            .finish_non_exhaustive()
    }
}

/// Initialize the operator runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - tracing subscriber setup
/// - probe server startup
/// - Kubernetes client creation
/// - controller context setup
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before anything opens a TLS connection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zookeeper_operator=info".into()),
        )
        .init();

    info!("Starting ZooKeeper operator v{}", env!("CARGO_PKG_VERSION"));

    let server_config = ServerConfig::from_env();
    let controller_config = ControllerConfig::from_env();
    info!("Controller configuration: {:?}", controller_config);

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = server_state.clone();
    let server_port = server_config.probe_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {:#}", e);
        }
    });
    wait_for_server_ready(&server_config, &server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let (documents, secrets): (Api<ZooKeeperService>, Api<Secret>) =
        match &controller_config.watch_namespace {
            Some(namespace) => {
                info!("Watching namespace {}", namespace);
                (
                    Api::namespaced(client.clone(), namespace),
                    Api::namespaced(client.clone(), namespace),
                )
            }
            None => {
                info!("Watching all namespaces");
                (Api::all(client.clone()), Api::all(client.clone()))
            }
        };

    let connector = Arc::new(
        VaultConnector::new(controller_config.service_account_token_path.clone())
            .context("Failed to build Vault HTTP client")?,
    );
    let controller = Arc::new(ServiceController::new(
        KubeStore::new(client.clone()),
        controller_config,
        connector,
    ));

    log_existing_documents(&documents).await;
    info!("Operator initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        documents,
        secrets,
        controller,
        server_state,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    config: &ServerConfig,
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let startup_timeout = std::time::Duration::from_secs(config.startup_timeout_secs);
    let poll_interval = std::time::Duration::from_millis(config.poll_interval_ms);
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state
            .is_ready
            .load(std::sync::atomic::Ordering::Relaxed)
        {
            info!("HTTP server is ready and accepting connections");
            break;
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }

    Ok(())
}

/// Check the CRD is installed and summarize the documents found per namespace
///
/// The controller's initial list reconciles every document, so nothing is
/// reconciled here.
async fn log_existing_documents(documents: &Api<ZooKeeperService>) {
    let span = tracing::span!(
        tracing::Level::INFO,
        "controller.startup.existing_documents"
    );
    let _guard = span.enter();

    match documents.list(&ListParams::default()).await {
        Ok(list) => {
            let mut by_namespace: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for item in &list.items {
                by_namespace
                    .entry(item.namespace_or_default())
                    .or_default()
                    .push(item.metadata.name.clone().unwrap_or_default());
            }
            info!(
                "CRD is queryable, found {} existing ZooKeeperService documents in {} namespaces",
                list.items.len(),
                by_namespace.len()
            );
            for (namespace, mut names) in by_namespace {
                names.sort();
                info!("Namespace {}: {}", namespace, names.join(", "));
            }
        }
        Err(e) => {
            error!("CRD is not queryable; {:?}. Is the CRD installed?", e);
            error!("Installation: cargo run --bin crdgen | kubectl apply -f -");
            warn!("Continuing despite CRD queryability check failure - the watch will retry");
        }
    }
}
