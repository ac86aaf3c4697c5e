//! # Custom Resource Definitions
//!
//! CRD types for the ZooKeeper operator.
//!
//! `ZooKeeperService` is the single desired-state document: one document
//! governs one ensemble and its auxiliary components. Desired-state subtrees
//! are read-only to the operator; only the status subtree is written.

mod components;
mod status;
mod vault;

pub use components::*;
pub use status::*;
pub use vault::*;

use k8s_openapi::api::core::v1::{Affinity, PodSecurityContext, ResourceRequirements, Toleration};
use kube::CustomResource;
use kube::ResourceExt;
use schemars::{Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ZooKeeperService Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: qubership.org/v1
/// kind: ZooKeeperService
/// metadata:
///   name: zookeeper
///   namespace: zookeeper-service
/// spec:
///   global:
///     waitForPodsReady: true
///     podReadinessTimeout: 300
///   zooKeeper:
///     dockerImage: zookeeper:3.8
///     replicas: 3
///     secretName: zookeeper-secret
///     storage:
///       className: ["standard"]
///       size: 2Gi
/// ```
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ZooKeeperService",
    group = "qubership.org",
    version = "v1",
    namespaced,
    status = "ZooKeeperServiceStatus",
    shortname = "zks",
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.zooKeeper.replicas"}, {"name":"Status", "type":"string", "jsonPath":".status.conditions[?(@.reason==\"ReconcileCycleStatus\")].type"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ZooKeeperServiceSpec {
    /// Settings shared by every component
    #[serde(default)]
    pub global: GlobalConfig,
    /// Coordination ensemble
    #[serde(default)]
    pub zoo_keeper: Option<ZooKeeperConfig>,
    /// Monitoring agent
    #[serde(default)]
    pub monitoring: Option<MonitoringConfig>,
    /// Backup daemon
    #[serde(default)]
    pub backup_daemon: Option<BackupDaemonConfig>,
    /// Delegated credential management through Vault
    #[serde(default)]
    pub vault_secret_management: Option<VaultConfig>,
    /// Integration test gate
    #[serde(default)]
    pub integration_tests: Option<IntegrationTestsConfig>,
}

/// Settings shared by every component
///
/// Changing anything here forces every component to re-apply its resources.
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    /// Wait for workloads to report ready after a changed pass
    #[serde(default)]
    pub wait_for_pods_ready: bool,
    /// Readiness poll bound for ensemble, monitoring and backup daemon (seconds)
    #[serde(default)]
    pub pod_readiness_timeout: u64,
    /// Labels added to every pod template
    #[serde(default)]
    pub custom_labels: BTreeMap<String, String>,
    /// Labels added to every managed resource
    #[serde(default)]
    pub default_labels: BTreeMap<String, String>,
    /// TLS for ZooKeeper client connections
    #[serde(default)]
    pub zoo_keeper_ssl: TlsSecretConfig,
}

/// TLS toggle with the secret that carries certificates
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TlsSecretConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

impl TlsSecretConfig {
    /// Secret name when TLS is enabled and a secret is configured
    pub fn active_secret(&self) -> Option<&str> {
        self.secret_name
            .as_deref()
            .filter(|name| self.enabled && !name.is_empty())
    }
}

/// Fields shared by the pod-bearing components
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodSettings {
    #[serde(default)]
    pub docker_image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub affinity: Option<Affinity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(schema_with = "preserve_unknown_fields_list")]
    pub tolerations: Vec<Toleration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub security_context: Option<PodSecurityContext>,
    /// Labels added to this component's pod template
    #[serde(default)]
    pub custom_labels: BTreeMap<String, String>,
}

impl ZooKeeperService {
    /// Whether credentials are delegated to Vault
    pub fn vault_enabled(&self) -> bool {
        self.spec
            .vault_secret_management
            .as_ref()
            .is_some_and(|vault| vault.enabled)
    }

    /// Namespace of the document ("default" when unset)
    pub fn namespace_or_default(&self) -> String {
        self.namespace().unwrap_or_else(|| "default".to_string())
    }
}

/// Schema for embedded Kubernetes objects that the API server validates itself
fn preserve_unknown_fields(_gen: &mut SchemaGenerator) -> Schema {
    let schema_value = serde_json::json!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    });
    Schema::try_from(schema_value).expect("Failed to create Schema for embedded object")
}

/// Schema for lists of embedded Kubernetes objects
fn preserve_unknown_fields_list(_gen: &mut SchemaGenerator) -> Schema {
    let schema_value = serde_json::json!({
        "type": "array",
        "items": {
            "type": "object",
            "x-kubernetes-preserve-unknown-fields": true
        }
    });
    Schema::try_from(schema_value).expect("Failed to create Schema for embedded object list")
}
