//! # Integration Tests Reconciler
//!
//! The test runner is deployed externally; the operator only reports its
//! outcome when asked to wait for it.

use super::{readiness_check, ComponentReconciler, DocumentScope, PassContext, ReadinessMessages};
use crate::controller::error::ReconcilerError;
use crate::controller::store::ObjectStore;
use crate::crd::IntegrationTestsConfig;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

const READINESS: ReadinessMessages = ReadinessMessages {
    reason: "ZooKeeperIntegrationTestsStatus",
    checking: "Start checking for ZooKeeper Integration Tests",
    failed: "ZooKeeper Integration Tests failed. See more details in integration test logs.",
    ready: "ZooKeeper Integration Tests performed successfully",
};

#[derive(Debug, Clone)]
pub struct IntegrationTestsReconciler {
    scope: DocumentScope,
    config: IntegrationTestsConfig,
}

impl IntegrationTestsReconciler {
    pub fn new(scope: DocumentScope, config: IntegrationTestsConfig) -> Self {
        Self { scope, config }
    }
}

#[async_trait]
impl<S: ObjectStore> ComponentReconciler<S> for IntegrationTestsReconciler {
    fn name(&self) -> &'static str {
        "ZooKeeper Integration Tests"
    }

    async fn reconcile(&self, _pass: &mut PassContext<'_, S>) -> Result<(), ReconcilerError> {
        Ok(())
    }

    async fn status(&self, pass: &mut PassContext<'_, S>) -> Result<(), ReconcilerError> {
        if !self.config.wait_for_result {
            return Ok(());
        }
        info!(
            "Waiting for integration tests of {} in deployment {}",
            self.scope.name, self.config.service_name
        );
        readiness_check(
            pass,
            READINESS,
            std::slice::from_ref(&self.config.service_name),
            Duration::from_secs(self.config.timeout),
        )
        .await
    }
}
