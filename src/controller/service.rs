//! # Service Controller
//!
//! Top-level reconciliation of one `ZooKeeperService` document.
//!
//! A pass:
//! 1. fetches the document (absent means deleted, nothing to do)
//! 2. hashes the whole spec and the `global` subtree
//! 3. on a spec change, restarts the condition list with `In progress`
//! 4. opens a Vault session when delegated credentials are enabled
//! 5. runs every component reconciler in order, aborting on the first error
//! 6. on a spec change with `waitForPodsReady`, runs every readiness check
//! 7. records the aggregate outcome and only then stores the hashes
//!
//! A failed pass forgets the spec hash, so the next pass starts a fresh cycle.

use crate::config::ControllerConfig;
use crate::controller::backoff::BackoffState;
use crate::controller::cache::{CacheRegistry, GLOBAL_HASH_KEY, SPEC_HASH_KEY};
use crate::controller::conditions::{has_failed_conditions, RECONCILE_CYCLE_REASON};
use crate::controller::error::ReconcilerError;
use crate::controller::hash::content_hash;
use crate::controller::reconciler::{reconcilers_for, PassContext};
use crate::controller::store::ObjectStore;
use crate::crd::{ConditionType, StatusCondition, ZooKeeperService};
use crate::provider::SecretStoreConnector;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{error, info, info_span, Instrument};

/// Controller context shared by every reconciliation
pub struct ServiceController<S: ObjectStore> {
    store: S,
    config: ControllerConfig,
    connector: Arc<dyn SecretStoreConnector>,
    caches: CacheRegistry,
    /// Per-resource error backoff, keyed by `namespace/name`
    pub backoff_states: Mutex<HashMap<String, BackoffState>>,
}

impl<S: ObjectStore> std::fmt::Debug for ServiceController<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceController")
            .field("config", &self.config)
            .field("connector", &self.connector)
            .field("caches", &self.caches)
            .finish_non_exhaustive()
    }
}

impl<S: ObjectStore + 'static> ServiceController<S> {
    pub fn new(store: S, config: ControllerConfig, connector: Arc<dyn SecretStoreConnector>) -> Self {
        Self {
            store,
            config,
            connector,
            caches: CacheRegistry::default(),
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reconcile the document `namespace/name`
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<(), ReconcilerError> {
        let span = info_span!(
            "controller.reconcile",
            resource.name = name,
            resource.namespace = namespace
        );
        self.reconcile_document(namespace, name).instrument(span).await
    }

    async fn reconcile_document(&self, namespace: &str, name: &str) -> Result<(), ReconcilerError> {
        let key = format!("{namespace}/{name}");
        let Some(document) = self
            .store
            .get::<ZooKeeperService>(namespace, name)
            .await?
        else {
            info!("ZooKeeperService {} not found, it was probably deleted", key);
            self.caches.forget(&key);
            return Ok(());
        };
        info!("Reconciling ZooKeeperService {}", key);

        let spec_hash = content_hash(&document.spec)?;
        let global_hash = content_hash(&document.spec.global)?;
        let cache = self.caches.checkout(&key);
        let mut pass = PassContext::new(&self.store, &self.config, document, global_hash, cache);
        let result = self.run_pass(&mut pass, spec_hash).await;
        if result.is_err() {
            // The retry must restart the cycle and record its own outcome
            pass.cache.forget_hash(SPEC_HASH_KEY);
        }
        self.caches.checkin(&key, pass.cache);
        result
    }

    async fn run_pass(
        &self,
        pass: &mut PassContext<'_, S>,
        spec_hash: String,
    ) -> Result<(), ReconcilerError> {
        let changed = pass.cache.hash(SPEC_HASH_KEY) != Some(spec_hash.as_str());
        if changed {
            pass.clear_conditions();
            pass.update_condition(cycle_condition(
                false,
                ConditionType::InProgress,
                "Reconciliation cycle started",
            ))
            .await?;
        }

        if let Some(vault) = pass
            .document
            .spec
            .vault_secret_management
            .clone()
            .filter(|vault| vault.enabled)
        {
            match self.connector.connect(&vault).await {
                Ok(secret_store) => pass.secret_store = Some(secret_store),
                Err(e) => {
                    error!("Failed to create Vault client: {}", e);
                    pass.update_condition(cycle_condition(
                        false,
                        ConditionType::Failed,
                        format!("An error occurred while creating Vault client: {e}"),
                    ))
                    .await?;
                    return Err(e.into());
                }
            }
        }

        let reconcilers = reconcilers_for::<S>(&pass.document);
        for reconciler in &reconcilers {
            let span = info_span!("controller.component", component = reconciler.name());
            if let Err(e) = reconciler.reconcile(pass).instrument(span).await {
                error!("Reconciliation cycle failed for {}: {}", reconciler.name(), e);
                pass.update_condition(cycle_condition(
                    false,
                    ConditionType::Failed,
                    format!(
                        "Reconciliation cycle failed for {} due to: {e}",
                        reconciler.name()
                    ),
                ))
                .await?;
                return Err(e);
            }
        }

        if changed && pass.document.spec.global.wait_for_pods_ready {
            pass.update_condition(cycle_condition(
                false,
                ConditionType::InProgress,
                "Checking deployment readiness status",
            ))
            .await?;
            tokio::time::sleep(self.config.settle_delay).await;

            for reconciler in &reconcilers {
                let span = info_span!("controller.component.status", component = reconciler.name());
                if let Err(e) = reconciler.status(pass).instrument(span).await {
                    error!("Status check failed for {}: {}", reconciler.name(), e);
                    pass.update_condition(cycle_condition(
                        false,
                        ConditionType::Failed,
                        format!(
                            "The status reconciliation cycle failed for {} due to: {e}",
                            reconciler.name()
                        ),
                    ))
                    .await?;
                    return Err(e);
                }
            }
        }

        if changed {
            let failed = pass
                .document
                .status
                .as_ref()
                .is_some_and(|status| has_failed_conditions(&status.conditions));
            let condition = if failed {
                cycle_condition(
                    false,
                    ConditionType::Failed,
                    "The deployment readiness status check failed",
                )
            } else {
                cycle_condition(
                    true,
                    ConditionType::Successful,
                    "The deployment readiness status check is successful",
                )
            };
            pass.update_condition(condition).await?;
        }

        pass.cache.set_hash(SPEC_HASH_KEY, spec_hash);
        let global_hash = pass.global_hash.clone();
        pass.cache.set_hash(GLOBAL_HASH_KEY, global_hash);
        info!("Reconciliation pass finished");
        Ok(())
    }
}

fn cycle_condition(
    status: bool,
    r#type: ConditionType,
    message: impl Into<String>,
) -> StatusCondition {
    StatusCondition::new(status, r#type, RECONCILE_CYCLE_REASON, message)
}
