//! # Secret Store Providers
//!
//! Delegated credential storage used when Vault secret management is enabled.
//!
//! Reconcilers depend on the [`SecretStore`] trait only. A session is opened
//! through a [`SecretStoreConnector`] at the start of each pass, which lets
//! tests swap in an in-memory store.

pub mod vault;

pub use vault::{VaultClient, VaultConnector};

use crate::crd::VaultConfig;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use zeroize::Zeroizing;

/// Key/value payload of a KV secret
pub type SecretFields = BTreeMap<String, String>;

/// Secret store failure
#[derive(Debug, Error)]
pub enum SecretStoreError {
    /// Connection parameters are unusable; needs a desired-state edit
    #[error("{0}")]
    InvalidConfiguration(String),
    #[error("failed to read service account token from {path}: {source}")]
    Token {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Vault request to {path} failed: {source}")]
    Http {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Vault request to {path} returned {status}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },
    #[error("unexpected Vault response from {path}: {reason}")]
    Malformed { path: String, reason: String },
}

/// Delegated secret store session
///
/// `read_*` operations return `None` when the object does not exist.
#[async_trait]
pub trait SecretStore: Send + Sync + std::fmt::Debug {
    /// Read the latest version of `{path}/data/{name}`
    async fn read_secret(
        &self,
        path: &str,
        name: &str,
    ) -> Result<Option<SecretFields>, SecretStoreError>;

    /// Write a new version of `{path}/data/{name}`; returns the version number
    async fn write_secret(
        &self,
        path: &str,
        name: &str,
        fields: &SecretFields,
    ) -> Result<u64, SecretStoreError>;

    async fn read_policy(&self, name: &str) -> Result<Option<String>, SecretStoreError>;

    async fn write_policy(&self, name: &str, policy: &str) -> Result<(), SecretStoreError>;

    async fn read_auth_role(
        &self,
        name: &str,
    ) -> Result<Option<serde_json::Value>, SecretStoreError>;

    async fn write_auth_role(
        &self,
        name: &str,
        role: &serde_json::Value,
    ) -> Result<(), SecretStoreError>;

    async fn write_password_policy(&self, name: &str, policy: &str)
        -> Result<(), SecretStoreError>;

    /// Generate a password from a previously written password policy
    async fn generate_password(
        &self,
        policy_name: &str,
    ) -> Result<Zeroizing<String>, SecretStoreError>;
}

/// Opens authenticated secret store sessions
#[async_trait]
pub trait SecretStoreConnector: Send + Sync + std::fmt::Debug {
    async fn connect(&self, config: &VaultConfig) -> Result<Arc<dyn SecretStore>, SecretStoreError>;
}

/// Reject connection parameters that cannot work
pub fn check_connection_parameters(config: &VaultConfig) -> Result<(), SecretStoreError> {
    let missing = if config.url.is_empty() {
        Some("vault: Vault connection URL is empty")
    } else if config.method.is_empty() {
        Some("vault: Vault authentication method is empty")
    } else if config.role.is_empty() {
        Some("vault: Vault operator role is empty")
    } else if config.path.is_empty() {
        Some("vault: Vault secret store path is empty")
    } else {
        None
    };
    match missing {
        Some(message) => Err(SecretStoreError::InvalidConfiguration(message.to_string())),
        None => Ok(()),
    }
}
