//! # Vault settings
//!
//! Delegated credential management configuration.

use serde::{Deserialize, Serialize};

/// Password generation mechanism value that delegates to a Vault password policy
pub const VAULT_PASSWORD_MECHANISM: &str = "vault";

/// Delegated credential management through Vault
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultConfig {
    /// Image carrying the `vault-env` binary copied into workload pods
    #[serde(default)]
    pub docker_image: String,
    #[serde(default)]
    pub enabled: bool,
    /// KV v2 mount holding component secrets
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub url: String,
    /// Role the operator logs in with
    #[serde(default)]
    pub role: String,
    /// Auth method mount (for example `kubernetes`)
    #[serde(default)]
    pub method: String,
    /// `vault` generates through a Vault password policy, anything else generates locally
    #[serde(default)]
    pub password_generation_mechanism: String,
    /// Write ACL policies and auth roles for component workloads
    #[serde(default)]
    pub write_policies: bool,
}

impl VaultConfig {
    /// Whether passwords come from a Vault password policy
    pub fn uses_vault_generator(&self) -> bool {
        self.password_generation_mechanism == VAULT_PASSWORD_MECHANISM
    }
}
