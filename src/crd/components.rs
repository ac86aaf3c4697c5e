//! # Component subtrees
//!
//! Desired state for the ensemble, monitoring agent, backup daemon and
//! integration test gate.

use super::{PodSettings, TlsSecretConfig};
use serde::{Deserialize, Serialize};

/// Coordination ensemble
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ZooKeeperConfig {
    #[serde(flatten)]
    pub pod: PodSettings,
    /// Number of peers; peer ordinals run from 1 to `replicas`
    #[serde(default)]
    pub replicas: i32,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub snapshot_storage: SnapshotStorageConfig,
    /// JVM heap size (MB)
    #[serde(default)]
    pub heap_size: i32,
    /// Local secret with credentials (watched for rotation in Vault mode)
    #[serde(default)]
    pub secret_name: String,
    #[serde(default)]
    pub quorum_auth_enabled: bool,
    #[serde(default)]
    pub ssl: SslConfig,
    #[serde(default)]
    pub jolokia_port: i32,
    /// Extra `NAME=value` environment variables
    #[serde(default)]
    pub environment_variables: Vec<String>,
    /// Restart peers one at a time, waiting for readiness between them
    #[serde(default)]
    pub rolling_update: bool,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub audit_enabled: bool,
}

/// Per-peer data storage
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Persistent volume names, one per peer
    #[serde(default)]
    pub volumes: Vec<String>,
    /// Node names, one per peer; pins each peer to its node
    #[serde(default)]
    pub nodes: Vec<String>,
    /// `key=value` persistent volume labels, one per peer
    #[serde(default)]
    pub labels: Vec<String>,
    /// Storage classes, either one for all peers or one per peer
    #[serde(default)]
    pub class_name: Vec<String>,
    #[serde(default)]
    pub size: String,
}

/// How a snapshot or backup claim is provisioned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PersistentVolumeType {
    /// Non-shared claim bound by volume name, label or class
    Standalone,
    /// Claim that must already exist
    PredefinedClaim,
    /// Shared claim bound to a named persistent volume
    Predefined,
    /// Shared claim provisioned by a storage class
    StorageClass,
}

impl PersistentVolumeType {
    pub fn as_str(self) -> &'static str {
        match self {
            PersistentVolumeType::Standalone => "standalone",
            PersistentVolumeType::PredefinedClaim => "predefined_claim",
            PersistentVolumeType::Predefined => "predefined",
            PersistentVolumeType::StorageClass => "storage_class",
        }
    }
}

/// Shared storage for snapshots and backups
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStorageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_type: Option<PersistentVolumeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(default)]
    pub volume_size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

impl SnapshotStorageConfig {
    /// Claim name, `pvc-{name}-snapshots` unless overridden
    pub fn claim_name(&self, service_name: &str) -> String {
        self.persistent_volume_claim_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("pvc-{service_name}-snapshots"))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SslConfig {
    #[serde(default)]
    pub cipher_suites: Vec<String>,
    #[serde(default)]
    pub enable_two_way_ssl: bool,
    #[serde(default)]
    pub allow_nonencrypted_access: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsConfig {
    /// `dev` or `prod` enables the diagnostic agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_service: Option<String>,
}

/// Monitoring agent
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringConfig {
    #[serde(flatten)]
    pub pod: PodSettings,
    /// `prometheus` exposes an extra scrape port
    #[serde(default)]
    pub monitoring_type: String,
    #[serde(default)]
    pub zoo_keeper_host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoo_keeper_backup_daemon_host: Option<String>,
    #[serde(default)]
    pub secret_name: String,
    #[serde(default)]
    pub zoo_keeper_jolokia_port: i32,
}

/// Backup daemon
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackupDaemonConfig {
    #[serde(flatten)]
    pub pod: PodSettings,
    #[serde(default)]
    pub backup_storage: SnapshotStorageConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_schedule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Config>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eviction_policy: Option<String>,
    #[serde(default)]
    pub ipv6: bool,
    #[serde(default)]
    pub zoo_keeper_host: String,
    #[serde(default)]
    pub zoo_keeper_port: i32,
    #[serde(default)]
    pub secret_name: String,
    #[serde(default)]
    pub backup_daemon_ssl: TlsSecretConfig,
}

impl BackupDaemonConfig {
    /// Whether backups are shipped to S3
    pub fn s3_enabled(&self) -> bool {
        self.s3.as_ref().is_some_and(|s3| s3.enabled)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct S3Config {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
    #[serde(default)]
    pub ssl_verify: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_secret_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_cert: Option<String>,
}

/// Integration test gate
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationTestsConfig {
    /// Workload that runs the tests
    #[serde(default)]
    pub service_name: String,
    /// Block the status check on the test workload
    #[serde(default)]
    pub wait_for_result: bool,
    /// Bound for the status check (seconds)
    #[serde(default)]
    pub timeout: u64,
    /// Any change forces a re-run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_run_trigger: Option<String>,
}
