//! # Watch Loop
//!
//! Runs the `kube_runtime` controller over `ZooKeeperService` documents.
//! Changes to owned secrets re-trigger the owning document, which is how a
//! credential refresh request reaches the reconcilers.

use super::error_policy::{handle_reconciliation_error, handle_watch_stream_error, reset_backoff};
use super::initialization::InitializationResult;
use crate::constants::WATCH_TIMEOUT_SECS;
use crate::controller::error::ReconcilerError;
use crate::controller::store::ObjectStore;
use crate::controller::{KubeStore, ServiceController};
use crate::crd::ZooKeeperService;
use anyhow::Result;
use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use tracing::{debug, info};

/// Reconcile one document and translate the outcome into a controller action
pub async fn reconcile<S: ObjectStore + 'static>(
    document: Arc<ZooKeeperService>,
    ctx: Arc<ServiceController<S>>,
) -> Result<Action, ReconcilerError> {
    let name = document.name_any();
    let namespace = document.namespace_or_default();
    ctx.reconcile(&namespace, &name).await?;
    reset_backoff(&ctx, &namespace, &name);
    Ok(Action::await_change())
}

/// Run the controller until a shutdown signal arrives
pub async fn run_watch_loop(init: InitializationResult) -> Result<()> {
    let InitializationResult {
        documents,
        secrets,
        controller,
        ..
    } = init;

    Controller::new(documents, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
        .owns(secrets, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
        .shutdown_on_signal()
        .run(
            reconcile::<KubeStore>,
            handle_reconciliation_error::<KubeStore>,
            controller,
        )
        .for_each(|result| async move {
            match result {
                Ok((object, action)) => {
                    debug!(?action, "Reconciliation of {} completed", object.name);
                }
                Err(e) => handle_watch_stream_error(&e.to_string()),
            }
        })
        .await;

    info!("Controller stopped");
    Ok(())
}
