//! # Vault Provider
//!
//! Opens Vault sessions with the Kubernetes auth method.
//!
//! The operator's service account JWT is read from disk on every connect,
//! so projected token rotation is picked up without a restart.

mod client;

pub use client::VaultClient;

use crate::crd::VaultConfig;
use crate::provider::{check_connection_parameters, SecretStore, SecretStoreConnector, SecretStoreError};
use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use zeroize::Zeroizing;

const VAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connects to Vault with the service account token at `token_path`
#[derive(Debug, Clone)]
pub struct VaultConnector {
    http: ReqwestClient,
    token_path: PathBuf,
}

impl VaultConnector {
    pub fn new(token_path: impl Into<PathBuf>) -> Result<Self, SecretStoreError> {
        let http = ReqwestClient::builder()
            .timeout(VAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|source| SecretStoreError::Http {
                path: "<client>".to_string(),
                source,
            })?;
        Ok(Self {
            http,
            token_path: token_path.into(),
        })
    }

    async fn service_account_jwt(&self) -> Result<Zeroizing<String>, SecretStoreError> {
        let raw = tokio::fs::read_to_string(&self.token_path)
            .await
            .map_err(|source| SecretStoreError::Token {
                path: self.token_path.display().to_string(),
                source,
            })?;
        Ok(Zeroizing::new(raw.trim().to_string()))
    }
}

#[async_trait]
impl SecretStoreConnector for VaultConnector {
    async fn connect(&self, config: &VaultConfig) -> Result<Arc<dyn SecretStore>, SecretStoreError> {
        check_connection_parameters(config)?;
        let jwt = self.service_account_jwt().await?;
        let client = VaultClient::login(self.http.clone(), config, &jwt).await?;
        Ok(Arc::new(client))
    }
}
