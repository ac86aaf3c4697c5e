//! # Monitoring Reconciler

use super::{readiness_check, ComponentReconciler, DocumentScope, PassContext, ReadinessMessages};
use crate::controller::cache::MONITORING_HASH_KEY;
use crate::controller::credentials::{watch_secret, CredentialManager, WatchedSecret};
use crate::controller::error::ReconcilerError;
use crate::controller::hash::content_hash;
use crate::controller::readiness::pod_names;
use crate::controller::store::ObjectStore;
use crate::crd::MonitoringConfig;
use crate::templates::vault as vault_templates;
use crate::templates::MonitoringTemplates;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

const READINESS: ReadinessMessages = ReadinessMessages {
    reason: "ZooKeeperMonitoringReadinessStatus",
    checking: "ZooKeeper Monitoring health check",
    failed: "ZooKeeper Monitoring pod is not ready",
    ready: "ZooKeeper Monitoring pod is ready",
};

#[derive(Debug, Clone)]
pub struct MonitoringReconciler {
    scope: DocumentScope,
    config: MonitoringConfig,
}

impl MonitoringReconciler {
    pub fn new(scope: DocumentScope, config: MonitoringConfig) -> Self {
        Self { scope, config }
    }

    fn templates(&self) -> MonitoringTemplates<'_> {
        MonitoringTemplates::new(
            &self.scope.name,
            &self.scope.namespace,
            &self.scope.spec.global,
            &self.config,
            self.scope.spec.backup_daemon.as_ref(),
            self.scope.vault(),
        )
    }

    /// Policies and role only; monitoring reads the ensemble's client credentials
    async fn process_vault<S: ObjectStore>(
        &self,
        pass: &PassContext<'_, S>,
        watched: &mut WatchedSecret,
    ) -> Result<(), ReconcilerError> {
        let (Some(vault), Some(secret_store)) = (self.scope.vault(), pass.secret_store.clone())
        else {
            return Ok(());
        };
        info!("Processing Vault secrets for ZooKeeper Monitoring");
        let templates = self.templates();
        let service = templates.service_name();
        let namespace = &self.scope.namespace;
        let credentials = CredentialManager::new(secret_store, vault, namespace, watched);

        if vault.write_policies {
            let policy = vault_templates::policy_name(service, namespace);
            credentials
                .ensure_policy(
                    &policy,
                    &vault_templates::read_policy(vault, service, namespace, &["*"]),
                )
                .await?;
            credentials
                .ensure_auth_role(
                    &vault_templates::role_name(service, namespace),
                    service,
                    &[
                        policy,
                        vault_templates::client_policy_name(&self.scope.name, namespace),
                    ],
                )
                .await?;
        }

        if watched.needs_cleaning() {
            watched.clean(pass.store, namespace).await?;
            info!("ZooKeeper Monitoring secret was cleaned");
        }
        Ok(())
    }
}

#[async_trait]
impl<S: ObjectStore> ComponentReconciler<S> for MonitoringReconciler {
    fn name(&self) -> &'static str {
        "ZooKeeper Monitoring"
    }

    async fn reconcile(&self, pass: &mut PassContext<'_, S>) -> Result<(), ReconcilerError> {
        let namespace = self.scope.namespace.as_str();
        let owner = pass.owner_reference().unwrap_or_default();
        let mut watched = watch_secret(
            pass.store,
            namespace,
            &self.config.secret_name,
            &owner,
            self.scope.vault().is_some(),
        )
        .await?;

        let hash = content_hash(&self.config)?;
        if pass
            .cache
            .is_unchanged(MONITORING_HASH_KEY, &hash, &pass.global_hash, &watched)
        {
            info!("ZooKeeper Monitoring configuration didn't change, skipping reconcile loop");
            return Ok(());
        }

        let templates = self.templates();
        let applier = pass.applier();
        applier.create_or_update(templates.service()).await?;
        applier.create_if_absent(templates.service_account()).await?;
        self.process_vault(pass, &mut watched).await?;
        applier.create_or_update(templates.deployment()).await?;

        info!("Updating ZooKeeper Monitoring status");
        let nodes = pod_names(pass.store, namespace, &templates.selector_labels()).await?;
        pass.status_mut().monitoring_status.nodes = nodes;
        pass.persist_status().await?;

        pass.cache.set_hash(MONITORING_HASH_KEY, hash);
        pass.cache.remember_secret(&watched);
        Ok(())
    }

    async fn status(&self, pass: &mut PassContext<'_, S>) -> Result<(), ReconcilerError> {
        info!("Start checking for ZooKeeper Monitoring pod");
        let deployment = self.templates().service_name().to_string();
        readiness_check(
            pass,
            READINESS,
            &[deployment],
            Duration::from_secs(self.scope.spec.global.pod_readiness_timeout),
        )
        .await
    }
}
