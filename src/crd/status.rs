//! # ZooKeeperService Status
//!
//! Observed state written by the operator: node lists, credential versions
//! and the ordered condition list.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Status of the ZooKeeperService resource
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ZooKeeperServiceStatus {
    #[serde(default)]
    pub zoo_keeper_status: ZooKeeperStatus,
    #[serde(default)]
    pub monitoring_status: NodeStatus,
    #[serde(default)]
    pub backup_daemon_status: NodeStatus,
    #[serde(default)]
    pub vault_secret_management_status: VaultSecretManagementStatus,
    /// Ordered audit trail of the reconciliation process, oldest reason first
    #[serde(default)]
    pub conditions: Vec<StatusCondition>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ZooKeeperStatus {
    #[serde(default)]
    pub servers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    #[serde(default)]
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultSecretManagementStatus {
    /// Vault secret path (`{svc}.{ns}/{secret}`) to the last written version
    #[serde(default)]
    pub secret_versions: BTreeMap<String, u64>,
}

/// Condition type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum ConditionType {
    #[serde(rename = "In progress")]
    InProgress,
    Ready,
    Failed,
    Successful,
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            ConditionType::InProgress => "In progress",
            ConditionType::Ready => "Ready",
            ConditionType::Failed => "Failed",
            ConditionType::Successful => "Successful",
        };
        f.write_str(value)
    }
}

/// Condition status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

/// A timestamped status record, de-duplicated by `reason`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusCondition {
    pub r#type: ConditionType,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    /// RFC3339 timestamp
    pub last_transition_time: String,
}

impl StatusCondition {
    pub fn new(
        status: bool,
        r#type: ConditionType,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            r#type,
            status: status.into(),
            reason: reason.into(),
            message: message.into(),
            last_transition_time: chrono::Utc::now().to_rfc3339(),
        }
    }
}
