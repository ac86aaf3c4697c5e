//! # Ensemble Reconciler
//!
//! Applies the ensemble's endpoints, claims and per-peer workloads, driving
//! peers through an [`EnsemblePlan`].

use super::ensemble::{EnsemblePlan, PeerStep};
use super::storage::snapshot_claim;
use super::{readiness_check, ComponentReconciler, DocumentScope, PassContext, ReadinessMessages};
use crate::controller::applier::ResourceApplier;
use crate::controller::cache::ZOOKEEPER_HASH_KEY;
use crate::controller::credentials::{
    watch_secret, CredentialManager, CredentialPlan, WatchedSecret,
};
use crate::controller::error::ReconcilerError;
use crate::controller::hash::content_hash;
use crate::controller::readiness::{is_deployment_ready, pod_names, poll_until, pods_running};
use crate::controller::store::ObjectStore;
use crate::crd::{PersistentVolumeType, ZooKeeperConfig};
use crate::templates::vault as vault_templates;
use crate::templates::zookeeper::{peer_name, selector_labels, zookeeper_labels};
use crate::templates::ZooKeeperTemplates;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;
use std::time::Duration;
use tracing::{info, info_span, Instrument};

const READINESS: ReadinessMessages = ReadinessMessages {
    reason: "ZooKeeperReadinessStatus",
    checking: "ZooKeeper health check",
    failed: "ZooKeeper pods are not ready",
    ready: "ZooKeeper pods are ready",
};

const CREDENTIALS: [CredentialPlan; 3] = [
    CredentialPlan::account("admin-credentials", "admin-username"),
    CredentialPlan::account("client-credentials", "client-username"),
    CredentialPlan::additional_users("additional-users", "additional-users", "users"),
];

#[derive(Debug, Clone)]
pub struct ZooKeeperReconciler {
    scope: DocumentScope,
    config: ZooKeeperConfig,
}

impl ZooKeeperReconciler {
    pub fn new(scope: DocumentScope, config: ZooKeeperConfig) -> Self {
        Self { scope, config }
    }

    fn templates(&self) -> ZooKeeperTemplates<'_> {
        ZooKeeperTemplates::new(
            &self.scope.name,
            &self.scope.namespace,
            &self.scope.spec.global,
            &self.config,
            self.scope.vault(),
        )
    }

    fn desired_peers(&self) -> u32 {
        u32::try_from(self.config.replicas).unwrap_or(0)
    }

    /// Ordinals of peer deployments with a non-zero replica count
    async fn active_ordinals<S: ObjectStore>(
        &self,
        applier: &ResourceApplier<'_, S>,
    ) -> Result<Vec<u32>, ReconcilerError> {
        let prefix = format!("{}-", self.scope.name);
        let deployments: Vec<Deployment> = applier.list(&selector_labels(&self.scope.name)).await?;
        Ok(deployments
            .iter()
            .filter(|d| d.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1) > 0)
            .filter_map(|d| d.name_any().strip_prefix(&prefix)?.parse().ok())
            .collect())
    }

    async fn apply_snapshot_claim<S: ObjectStore>(
        &self,
        applier: &ResourceApplier<'_, S>,
    ) -> Result<(), ReconcilerError> {
        let storage = &self.config.snapshot_storage;
        let shared = storage
            .persistent_volume_type
            .is_some_and(|t| t != PersistentVolumeType::Standalone);
        if !shared {
            return Ok(());
        }
        let labels = zookeeper_labels(&self.scope.name, &self.scope.spec.global.default_labels);
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
        info!("Processing Vault secrets for ZooKeeper");
        let name = &self.scope.name;
        let namespace = &self.scope.namespace;
        let credentials = CredentialManager::new(secret_store, vault, namespace, watched);

        if vault.write_policies {
            let admin_policy = vault_templates::admin_policy_name(name, namespace);
            credentials
                .ensure_policy(
                    &admin_policy,
                    &vault_templates::read_policy(vault, name, namespace, &["*"]),
                )
                .await?;
            credentials
                .ensure_auth_role(
                    &vault_templates::role_name(name, namespace),
                    name,
                    &[admin_policy],
                )
                .await?;
            credentials
                .ensure_policy(
                    &vault_templates::client_policy_name(name, namespace),
                    &vault_templates::read_policy(vault, name, namespace, &["client-credentials"]),
                )
                .await?;
        }

        let generator = credentials.password_generator(name).await?;
        let mut versions = pass.secret_versions_mut().clone();
        let mut written = false;
        for plan in &CREDENTIALS {
            written |= credentials
                .ensure_credential_secret(name, plan, watched, generator.as_ref(), &mut versions)
                .await?
                .is_some();
        }
        if written {
            *pass.secret_versions_mut() = versions;
            pass.persist_status().await?;
        }

        if watched.needs_cleaning() {
            watched.clean(pass.store, namespace).await?;
            info!("ZooKeeper secret was cleaned");
        }
        Ok(())
    }

    async fn run_step<S: ObjectStore>(
        &self,
        pass: &PassContext<'_, S>,
        applier: &ResourceApplier<'_, S>,
        step: PeerStep,
    ) -> Result<(), ReconcilerError> {
        let templates = self.templates();
        let config = pass.config;
        let peer = peer_name(&self.scope.name, step.ordinal());
        match step {
            PeerStep::ScaleDown(_) => applier.scale_deployment(&peer, 0).await?,
            PeerStep::Apply(ordinal) => {
                applier
                    .create_or_update(templates.peer_service(ordinal))
                    .await?;
                if let Some(claim) = templates.peer_claim(ordinal)? {
                    applier.create_if_absent(claim).await?;
                }
                applier
                    .create_or_update(templates.peer_deployment(ordinal))
                    .await?;
            }
            PeerStep::AwaitRunning(_) => {
                info!("Waiting for pod of {} deployment to be in 'Running' state", peer);
                let store = pass.store;
                let namespace = self.scope.namespace.as_str();
                let selector = &selector_labels(&self.scope.name);
                let peer = peer.as_str();
                poll_until(
                    &format!("pod of {peer} to be running"),
                    config.poll_interval,
                    config.peer_timeout,
                    false,
                    move || async move { Ok(pods_running(store, namespace, selector, peer).await?) },
                )
                .await?;
            }
            PeerStep::AwaitReady(_) => {
                tokio::time::sleep(config.settle_delay).await;
                info!("Waiting for {} deployment to be ready", peer);
                let store = pass.store;
                let namespace = self.scope.namespace.as_str();
                let peer = peer.as_str();
                poll_until(
                    &format!("deployment {peer} to be ready"),
                    config.poll_interval,
                    config.peer_timeout,
                    true,
                    move || async move { Ok(is_deployment_ready(store, namespace, peer).await) },
                )
                .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<S: ObjectStore> ComponentReconciler<S> for ZooKeeperReconciler {
    fn name(&self) -> &'static str {
        "ZooKeeper"
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

        // Only the zooKeeper subtree is hashed. Toggling vaultSecretManagement
        // alone is picked up on the next edit of this subtree or the secret.
        let hash = content_hash(&self.config)?;
        if pass
            .cache
            .is_unchanged(ZOOKEEPER_HASH_KEY, &hash, &pass.global_hash, &watched)
        {
            info!("ZooKeeper configuration didn't change, skipping reconcile loop");
            return Ok(());
        }

        let templates = self.templates();
        let applier = pass.applier();
        if self.config.replicas > 0 {
            self.apply_snapshot_claim(&applier).await?;
            applier.create_or_update(templates.client_service()).await?;
            applier.create_or_update(templates.domain_service()).await?;

            let active = self.active_ordinals(&applier).await?;
            let mut plan = EnsemblePlan::new(self.desired_peers(), &active, self.config.rolling_update);
            info!(
                "Ensemble has {} active of {} desired peers, mode {:?}",
                plan.active(),
                plan.desired(),
                plan.mode()
            );

            applier.create_if_absent(templates.service_account()).await?;
            self.process_vault(pass, &mut watched).await?;

            while let Some(step) = plan.next_step() {
                let span = info_span!("controller.component.peer", peer = step.ordinal());
                self.run_step(pass, &applier, step).instrument(span).await?;
                plan.advance(step);
            }
        }

        let servers = pod_names(pass.store, namespace, &selector_labels(&self.scope.name)).await?;
        pass.status_mut().zoo_keeper_status.servers = servers;
        pass.persist_status().await?;

        pass.cache.set_hash(ZOOKEEPER_HASH_KEY, hash);
        pass.cache.remember_secret(&watched);
        Ok(())
    }

    async fn status(&self, pass: &mut PassContext<'_, S>) -> Result<(), ReconcilerError> {
        info!("Start checking for ZooKeeper pods");
        let peers: Vec<String> = (1..=self.desired_peers())
            .map(|ordinal| peer_name(&self.scope.name, ordinal))
            .collect();
        readiness_check(
            pass,
            READINESS,
            &peers,
            Duration::from_secs(self.scope.spec.global.pod_readiness_timeout),
        )
        .await
    }
}
