//! # Component Reconcilers
//!
//! One reconciler per managed component, driven in a fixed order by the
//! service controller:
//!
//! 1. [`ZooKeeperReconciler`] - the ensemble
//! 2. [`MonitoringReconciler`]
//! 3. [`BackupDaemonReconciler`]
//! 4. [`IntegrationTestsReconciler`]
//!
//! Every reconciler exposes `reconcile` (apply resources) and `status`
//! (bounded readiness check that ends in a `Ready` or `Failed` condition).

mod backup_daemon;
pub mod ensemble;
mod integration_tests;
mod monitoring;
pub mod storage;
mod zookeeper;

pub use backup_daemon::BackupDaemonReconciler;
pub use integration_tests::IntegrationTestsReconciler;
pub use monitoring::MonitoringReconciler;
pub use zookeeper::ZooKeeperReconciler;

use crate::config::ControllerConfig;
use crate::controller::applier::ResourceApplier;
use crate::controller::cache::ChangeDetectionCache;
use crate::controller::conditions::add_condition;
use crate::controller::error::ReconcilerError;
use crate::controller::readiness::{all_deployments_ready, poll_until};
use crate::controller::store::ObjectStore;
use crate::crd::{
    ConditionType, StatusCondition, VaultConfig, ZooKeeperService, ZooKeeperServiceSpec,
    ZooKeeperServiceStatus,
};
use crate::provider::SecretStore;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// State shared by the reconcilers of one pass over one document
pub struct PassContext<'a, S: ObjectStore> {
    pub store: &'a S,
    pub config: &'a ControllerConfig,
    /// Vault session, present when delegated credentials are enabled
    pub secret_store: Option<Arc<dyn SecretStore>>,
    /// Hash of `spec.global` for this pass
    pub global_hash: String,
    pub cache: ChangeDetectionCache,
    pub document: ZooKeeperService,
    namespace: String,
}

impl<'a, S: ObjectStore> std::fmt::Debug for PassContext<'a, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassContext")
            .field("document", &self.document.name_any())
            .field("namespace", &self.namespace)
            .field("delegated", &self.secret_store.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a, S: ObjectStore> PassContext<'a, S> {
    pub fn new(
        store: &'a S,
        config: &'a ControllerConfig,
        document: ZooKeeperService,
        global_hash: String,
        cache: ChangeDetectionCache,
    ) -> Self {
        let namespace = document.namespace_or_default();
        Self {
            store,
            config,
            secret_store: None,
            global_hash,
            cache,
            document,
            namespace,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn owner_reference(&self) -> Option<OwnerReference> {
        self.document.controller_owner_ref(&())
    }

    /// Applier writing into the document's namespace, owned by the document
    pub fn applier(&self) -> ResourceApplier<'a, S> {
        ResourceApplier::new(self.store, self.namespace.clone(), self.owner_reference())
    }

    pub fn status_mut(&mut self) -> &mut ZooKeeperServiceStatus {
        self.document.status.get_or_insert_with(Default::default)
    }

    pub fn secret_versions_mut(&mut self) -> &mut BTreeMap<String, u64> {
        &mut self
            .status_mut()
            .vault_secret_management_status
            .secret_versions
    }

    /// Write the status subtree
    pub async fn persist_status(&mut self) -> Result<(), ReconcilerError> {
        let updated = self
            .store
            .update_status(&self.namespace, &self.document)
            .await?;
        // Keep the local status; the returned object may predate it on a slow cache
        let status = self.document.status.take();
        self.document = updated;
        self.document.status = status;
        Ok(())
    }

    /// Upsert a condition and write the status when the list changed
    pub async fn update_condition(
        &mut self,
        condition: StatusCondition,
    ) -> Result<(), ReconcilerError> {
        if add_condition(&mut self.status_mut().conditions, condition) {
            self.persist_status().await?;
        }
        Ok(())
    }

    /// Drop every condition (start of a changed cycle)
    pub fn clear_conditions(&mut self) {
        self.status_mut().conditions.clear();
    }
}

/// Immutable view of the document a reconciler works on
#[derive(Debug, Clone)]
pub struct DocumentScope {
    pub name: String,
    pub namespace: String,
    pub spec: ZooKeeperServiceSpec,
}

impl DocumentScope {
    pub fn new(document: &ZooKeeperService) -> Self {
        Self {
            name: document.name_any(),
            namespace: document.namespace_or_default(),
            spec: document.spec.clone(),
        }
    }

    /// Vault settings when delegated credentials are enabled
    pub fn vault(&self) -> Option<&VaultConfig> {
        self.spec
            .vault_secret_management
            .as_ref()
            .filter(|vault| vault.enabled)
    }
}

/// Uniform contract of a component reconciler
#[async_trait]
pub trait ComponentReconciler<S: ObjectStore>: Send + Sync {
    /// Component name used in conditions and logs
    fn name(&self) -> &'static str;

    /// Bring the component's resources to the desired state
    async fn reconcile(&self, pass: &mut PassContext<'_, S>) -> Result<(), ReconcilerError>;

    /// Wait for the component to become ready and record the outcome
    ///
    /// A readiness timeout is reported through a `Failed` condition, not
    /// returned as an error.
    async fn status(&self, pass: &mut PassContext<'_, S>) -> Result<(), ReconcilerError>;
}

/// Condition texts of one readiness check
#[derive(Debug, Clone, Copy)]
pub struct ReadinessMessages {
    pub reason: &'static str,
    pub checking: &'static str,
    pub failed: &'static str,
    pub ready: &'static str,
}

/// Poll until every deployment in `deployments` is ready or `timeout` elapses
///
/// Records `In progress` first, then `Ready` or `Failed`. Only store errors
/// while writing conditions are returned.
pub async fn readiness_check<S: ObjectStore>(
    pass: &mut PassContext<'_, S>,
    messages: ReadinessMessages,
    deployments: &[String],
    timeout: Duration,
) -> Result<(), ReconcilerError> {
    pass.update_condition(StatusCondition::new(
        false,
        ConditionType::InProgress,
        messages.reason,
        messages.checking,
    ))
    .await?;

    let store = pass.store;
    let namespace = pass.namespace.as_str();
    let ready = poll_until(
        messages.checking,
        pass.config.poll_interval,
        timeout,
        true,
        move || async move { Ok(all_deployments_ready(store, namespace, deployments).await) },
    )
    .await;

    let condition = match ready {
        Ok(()) => StatusCondition::new(true, ConditionType::Ready, messages.reason, messages.ready),
        Err(e) => {
            info!("{}: {}", messages.failed, e);
            StatusCondition::new(false, ConditionType::Failed, messages.reason, messages.failed)
        }
    };
    pass.update_condition(condition).await
}

/// Reconcilers for the components present in the document, in execution order
pub fn reconcilers_for<S: ObjectStore + 'static>(
    document: &ZooKeeperService,
) -> Vec<Box<dyn ComponentReconciler<S>>> {
    let scope = DocumentScope::new(document);
    let spec = &document.spec;
    let mut reconcilers: Vec<Box<dyn ComponentReconciler<S>>> = Vec::new();
    if let Some(zookeeper) = &spec.zoo_keeper {
        reconcilers.push(Box::new(ZooKeeperReconciler::new(
            scope.clone(),
            zookeeper.clone(),
        )));
    }
    if let Some(monitoring) = &spec.monitoring {
        reconcilers.push(Box::new(MonitoringReconciler::new(
            scope.clone(),
            monitoring.clone(),
        )));
    }
    if let Some(backup_daemon) = &spec.backup_daemon {
        reconcilers.push(Box::new(BackupDaemonReconciler::new(
            scope.clone(),
            backup_daemon.clone(),
        )));
    }
    if let Some(integration_tests) = &spec.integration_tests {
        reconcilers.push(Box::new(IntegrationTestsReconciler::new(
            scope,
            integration_tests.clone(),
        )));
    }
    reconcilers
}
