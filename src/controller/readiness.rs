//! # Readiness
//!
//! Bounded polling and the workload readiness predicates it drives.

use crate::controller::error::{ReconcilerError, StoreError};
use crate::controller::store::ObjectStore;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

const RUNNING_PHASE: &str = "Running";
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Poll `check` every `interval` until it yields `true` or `timeout` elapses
///
/// With `immediate` the first check runs before the first sleep. Errors
/// from `check` end the poll early.
pub async fn poll_until<F, Fut>(
    what: &str,
    interval: Duration,
    timeout: Duration,
    immediate: bool,
    mut check: F,
) -> Result<(), ReconcilerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, ReconcilerError>>,
{
    let deadline = Instant::now() + timeout;
    if immediate && check().await? {
        return Ok(());
    }
    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        tokio::time::sleep(interval.max(MIN_POLL_INTERVAL).min(deadline - now)).await;
        if check().await? {
            return Ok(());
        }
    }
    Err(ReconcilerError::Timeout {
        what: what.to_string(),
        timeout,
    })
}

/// `min(ready, updated) == desired`
pub fn deployment_is_ready(deployment: &Deployment) -> bool {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    let status = deployment.status.as_ref();
    let ready = status.and_then(|s| s.ready_replicas).unwrap_or(0);
    let updated = status.and_then(|s| s.updated_replicas).unwrap_or(0);
    desired == ready.min(updated)
}

/// Readiness of a deployment by name; lookup failures count as not ready
pub async fn is_deployment_ready<S: ObjectStore>(store: &S, namespace: &str, name: &str) -> bool {
    match store.get::<Deployment>(namespace, name).await {
        Ok(Some(deployment)) => deployment_is_ready(&deployment),
        Ok(None) => {
            debug!("Deployment {}/{} not found yet", namespace, name);
            false
        }
        Err(e) => {
            warn!("Cannot check status of deployment {}/{}: {}", namespace, name, e);
            false
        }
    }
}

/// Whether every peer deployment reports ready
pub async fn all_deployments_ready<S: ObjectStore>(
    store: &S,
    namespace: &str,
    names: &[String],
) -> bool {
    for name in names {
        if !is_deployment_ready(store, namespace, name).await {
            return false;
        }
    }
    true
}

/// Whether the pods of workload `name` exist and are all running
///
/// Pods are matched by the component selector plus the `name` label.
pub async fn pods_running<S: ObjectStore>(
    store: &S,
    namespace: &str,
    selector: &BTreeMap<String, String>,
    name: &str,
) -> Result<bool, StoreError> {
    let mut selector = selector.clone();
    selector.insert("name".to_string(), name.to_string());
    let pods: Vec<Pod> = store.list(namespace, &selector).await?;
    Ok(!pods.is_empty()
        && pods.iter().all(|pod| {
            pod.status
                .as_ref()
                .and_then(|status| status.phase.as_deref())
                == Some(RUNNING_PHASE)
        }))
}

/// `name` labels of the pods matching `selector`, sorted
pub async fn pod_names<S: ObjectStore>(
    store: &S,
    namespace: &str,
    selector: &BTreeMap<String, String>,
) -> Result<Vec<String>, StoreError> {
    let pods: Vec<Pod> = store.list(namespace, selector).await?;
    let mut names: Vec<String> = pods
        .iter()
        .filter_map(|pod| pod.metadata.labels.as_ref()?.get("name").cloned())
        .collect();
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DeploymentSpec, DeploymentStatus};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn deployment(replicas: i32, ready: i32, updated: i32) -> Deployment {
        Deployment {
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                ready_replicas: Some(ready),
                updated_replicas: Some(updated),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn ready_needs_ready_and_updated_at_desired() {
        assert!(deployment_is_ready(&deployment(1, 1, 1)));
        assert!(!deployment_is_ready(&deployment(1, 1, 0)));
        assert!(!deployment_is_ready(&deployment(1, 0, 1)));
        assert!(deployment_is_ready(&deployment(0, 0, 0)));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_stops_at_first_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        poll_until(
            "peer",
            Duration::from_secs(10),
            Duration::from_secs(300),
            false,
            || {
                let counter = counter.clone();
                async move { Ok(counter.fetch_add(1, Ordering::SeqCst) >= 2) }
            },
        )
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_times_out() {
        let error = poll_until(
            "pod of zk-1",
            Duration::from_secs(10),
            Duration::from_secs(30),
            true,
            || async { Ok(false) },
        )
        .await
        .unwrap_err();
        assert!(matches!(error, ReconcilerError::Timeout { .. }));
        assert_eq!(
            error.to_string(),
            "timed out after 30s waiting for pod of zk-1"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_still_sleeps_between_checks() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let error = poll_until(
            "peer",
            Duration::ZERO,
            Duration::from_millis(10),
            false,
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(false)
                }
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(error, ReconcilerError::Timeout { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }
}
