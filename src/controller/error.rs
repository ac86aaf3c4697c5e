//! # Errors
//!
//! Error taxonomy for reconciliation passes.
//!
//! - absent objects are `Option::None`, never an error
//! - [`StoreError`] and [`SecretStoreError`] are transient infrastructure failures
//! - [`ReconcilerError::Configuration`] will not resolve without a desired-state edit
//! - [`ReconcilerError::Timeout`] is a bounded poll running out

use crate::provider::SecretStoreError;
use std::time::Duration;
use thiserror::Error;

/// Object store failure
#[derive(Debug, Error)]
pub enum StoreError {
    /// Create raced with another writer
    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: String, name: String },
    /// Non-success API response
    #[error("{kind} {name}: API request failed with {code}: {message}")]
    Api {
        kind: String,
        name: String,
        code: u16,
        message: String,
    },
    #[error("Kubernetes client error: {0}")]
    Kube(#[from] kube::Error),
    #[error("failed to (de)serialize object: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Reconciliation failure
#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    SecretStore(SecretStoreError),
    #[error("{0}")]
    Configuration(String),
    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },
    #[error("failed to compute content hash: {0}")]
    Hash(#[from] serde_json::Error),
}

impl From<SecretStoreError> for ReconcilerError {
    fn from(error: SecretStoreError) -> Self {
        match error {
            SecretStoreError::InvalidConfiguration(message) => {
                ReconcilerError::Configuration(message)
            }
            other => ReconcilerError::SecretStore(other),
        }
    }
}

impl ReconcilerError {
    /// Whether retrying without a desired-state edit can help
    pub fn is_transient(&self) -> bool {
        !matches!(self, ReconcilerError::Configuration(_))
    }
}
