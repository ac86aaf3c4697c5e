//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! This module handles reconciliation errors and watch stream errors.

use crate::constants;
use crate::controller::backoff::BackoffState;
use crate::controller::error::ReconcilerError;
use crate::controller::store::ObjectStore;
use crate::controller::ServiceController;
use crate::crd::ZooKeeperService;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Requeue a failed document with Fibonacci backoff
///
/// Backoff state is tracked per document so one failing ensemble does not
/// slow down the others.
pub fn handle_reconciliation_error<S: ObjectStore + 'static>(
    document: Arc<ZooKeeperService>,
    error: &ReconcilerError,
    ctx: Arc<ServiceController<S>>,
) -> Action {
    let name = document.name_any();
    let namespace = document.namespace_or_default();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = %name,
        resource.namespace = %namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    if error.is_transient() {
        error!("Reconciliation error for {}: {}", name, error);
    } else {
        error!(
            "Reconciliation of {} failed on its configuration: {}; it will keep failing until the document is edited",
            name, error
        );
    }

    let config = ctx.config();
    let resource_key = format!("{namespace}/{name}");
    let (backoff_seconds, error_count) = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states
                .entry(resource_key)
                .or_insert_with(|| BackoffState::new(config.backoff_min_secs, config.backoff_max_secs));
            state.increment_error();
            (state.backoff.next_backoff_seconds(), state.error_count)
        }
        Err(e) => {
            warn!("Failed to lock backoff_states: {}, using default backoff", e);
            (constants::DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS, 0)
        }
    };

    let next_trigger_time = chrono::Utc::now()
        + chrono::Duration::seconds(i64::try_from(backoff_seconds).unwrap_or(i64::MAX));
    info!(
        "Retrying with Fibonacci backoff: {}s (error count: {})",
        backoff_seconds, error_count
    );
    info!(
        "Next retry scheduled: {} (in {}s)",
        next_trigger_time.to_rfc3339(),
        backoff_seconds
    );

    Action::requeue(Duration::from_secs(backoff_seconds))
}

/// Forget the error history of a document after a successful pass
pub fn reset_backoff<S: ObjectStore + 'static>(ctx: &ServiceController<S>, namespace: &str, name: &str) {
    if let Ok(mut states) = ctx.backoff_states.lock() {
        if let Some(state) = states.get_mut(&format!("{namespace}/{name}")) {
            state.reset();
        }
    }
}

/// Category of a watch stream failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// 401, RBAC revoked or token expired
    Unauthorized,
    /// 410, resource version too old
    Expired,
    /// 429, API server storage (re)initializing
    Throttled,
    NotFound,
    Other,
}

pub fn classify_watch_error(error: &str) -> WatchErrorKind {
    if error.contains("401") || error.contains("Unauthorized") || error.contains("WatchFailed") {
        WatchErrorKind::Unauthorized
    } else if error.contains("410")
        || error.contains("too old resource version")
        || error.contains("Expired")
        || error.contains("Gone")
    {
        WatchErrorKind::Expired
    } else if error.contains("429")
        || error.contains("storage is (re)initializing")
        || error.contains("TooManyRequests")
    {
        WatchErrorKind::Throttled
    } else if error.contains("ObjectNotFound")
        || (error.contains("404") && error.contains("not found"))
    {
        WatchErrorKind::NotFound
    } else {
        WatchErrorKind::Other
    }
}

/// Log a controller stream error with operator guidance
///
/// The watcher restarts itself with its own backoff; this only explains
/// what happened.
pub fn handle_watch_stream_error(error: &str) {
    let error_span = tracing::span!(tracing::Level::WARN, "controller.watch.error", error = %error);
    let _error_guard = error_span.enter();

    match classify_watch_error(error) {
        WatchErrorKind::Unauthorized => {
            error!("Watch authentication failed (401 Unauthorized) - RBAC may have been revoked or token expired");
            error!("   1. Verify the operator ClusterRole and ClusterRoleBinding still exist");
            error!("   2. Verify the operator ServiceAccount still exists");
            error!("   3. Check: kubectl auth can-i list zookeeperservices --as=system:serviceaccount:<ns>:zookeeper-operator");
            error!("   4. If RBAC was recently changed, restart the operator pod");
        }
        WatchErrorKind::Expired => {
            warn!("Watch resource version expired (410) - this is normal during restarts, watch will restart");
        }
        WatchErrorKind::Throttled => {
            warn!("API server storage reinitializing (429), watch will back off and restart");
        }
        WatchErrorKind::NotFound => {
            warn!("Resource not found (likely deleted), continuing watch...");
        }
        WatchErrorKind::Other => {
            error!("Controller stream error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_errors_are_classified() {
        assert_eq!(
            classify_watch_error("ApiError: Unauthorized (401)"),
            WatchErrorKind::Unauthorized
        );
        assert_eq!(
            classify_watch_error("too old resource version: 123 (456)"),
            WatchErrorKind::Expired
        );
        assert_eq!(
            classify_watch_error("storage is (re)initializing"),
            WatchErrorKind::Throttled
        );
        assert_eq!(
            classify_watch_error("ObjectNotFound: zk"),
            WatchErrorKind::NotFound
        );
        assert_eq!(classify_watch_error("connection reset"), WatchErrorKind::Other);
    }
}
