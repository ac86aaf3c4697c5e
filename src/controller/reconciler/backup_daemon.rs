//! # Backup Daemon Reconciler

use super::storage::snapshot_claim;
use super::{readiness_check, ComponentReconciler, DocumentScope, PassContext, ReadinessMessages};
use crate::controller::applier::ResourceApplier;
use crate::controller::cache::BACKUP_DAEMON_HASH_KEY;
use crate::controller::credentials::{
    watch_secret, CredentialManager, CredentialPlan, WatchedSecret,
};
use crate::controller::error::ReconcilerError;
use crate::controller::hash::content_hash;
use crate::controller::readiness::pod_names;
use crate::controller::store::ObjectStore;
use crate::crd::BackupDaemonConfig;
use crate::templates::vault as vault_templates;
use crate::templates::BackupDaemonTemplates;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use std::time::Duration;
use tracing::info;

const READINESS: ReadinessMessages = ReadinessMessages {
    reason: "ZooKeeperBackupDaemonReadinessStatus",
    checking: "ZooKeeper Backup Daemon health check",
    failed: "ZooKeeper Backup Daemon pod is not ready",
    ready: "ZooKeeper Backup Daemon pod is ready",
};

const CREDENTIALS: CredentialPlan = CredentialPlan::account("credentials", "username");

#[derive(Debug, Clone)]
pub struct BackupDaemonReconciler {
    scope: DocumentScope,
    config: BackupDaemonConfig,
}

impl BackupDaemonReconciler {
    pub fn new(scope: DocumentScope, config: BackupDaemonConfig) -> Self {
        Self { scope, config }
    }

    fn templates(&self) -> BackupDaemonTemplates<'_> {
        BackupDaemonTemplates::new(
            &self.scope.name,
            &self.scope.namespace,
            &self.scope.spec.global,
            &self.config,
            self.scope.vault(),
        )
    }

    /// Create the backup claim unless it already exists
    async fn apply_backup_claim<S: ObjectStore>(
        &self,
        applier: &ResourceApplier<'_, S>,
    ) -> Result<(), ReconcilerError> {
        let storage = &self.config.backup_storage;
        if storage.persistent_volume_type.is_none() {
            return Ok(());
        }
        let claim_name = storage.claim_name(&self.scope.name);
        if applier
            .find::<PersistentVolumeClaim>(&claim_name)
            .await?
            .is_some()
        {
            return Ok(());
        }
        let labels = self.templates().labels();
        if let Some(claim) = snapshot_claim(applier, storage, &self.scope.name, labels).await? {
            applier.create_if_absent(claim).await?;
        }
        Ok(())
    }

    async fn process_vault<S: ObjectStore>(
        &self,
        pass: &mut PassContext<'_, S>,
        watched: &mut WatchedSecret,
    ) -> Result<(), ReconcilerError> {
        let (Some(vault), Some(secret_store)) = (self.scope.vault(), pass.secret_store.clone())
        else {
            return Ok(());
        };
        info!("Processing Vault secrets for ZooKeeper Backup Daemon");
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
                        vault_templates::admin_policy_name(&self.scope.name, namespace),
                    ],
                )
                .await?;
        }

        let generator = credentials.password_generator(&self.scope.name).await?;
        let mut versions = pass.secret_versions_mut().clone();
        let written = credentials
            .ensure_credential_secret(service, &CREDENTIALS, watched, generator.as_ref(), &mut versions)
            .await?;
        if written.is_some() {
            *pass.secret_versions_mut() = versions;
            pass.persist_status().await?;
        }

        if watched.needs_cleaning() {
            watched.clean(pass.store, namespace).await?;
            info!("ZooKeeper Backup Daemon secret was cleaned");
        }
        Ok(())
    }
}

#[async_trait]
impl<S: ObjectStore> ComponentReconciler<S> for BackupDaemonReconciler {
    fn name(&self) -> &'static str {
        "ZooKeeper Backup Daemon"
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
            .is_unchanged(BACKUP_DAEMON_HASH_KEY, &hash, &pass.global_hash, &watched)
        {
            info!("Backup Daemon configuration didn't change, skipping reconcile loop");
            return Ok(());
        }

        let templates = self.templates();
        let applier = pass.applier();
        self.apply_backup_claim(&applier).await?;
        applier.create_or_update(templates.service()).await?;
        applier.create_if_absent(templates.service_account()).await?;
        self.process_vault(pass, &mut watched).await?;
        applier.create_or_update(templates.deployment()).await?;

        info!("Updating ZooKeeper Backup Daemon status");
        let nodes = pod_names(pass.store, namespace, &templates.selector_labels()).await?;
        pass.status_mut().backup_daemon_status.nodes = nodes;
        pass.persist_status().await?;

        pass.cache.set_hash(BACKUP_DAEMON_HASH_KEY, hash);
        pass.cache.remember_secret(&watched);
        Ok(())
    }

    async fn status(&self, pass: &mut PassContext<'_, S>) -> Result<(), ReconcilerError> {
        info!("Start checking for ZooKeeper Backup Daemon pod");
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
