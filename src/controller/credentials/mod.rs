//! # Credential Lifecycle
//!
//! Keeps component credentials, ACL policies and auth roles in Vault.
//!
//! Every operation is "write if absent or refresh requested". The refresh
//! request comes from the watched local secret; once a pass has processed
//! it, the owning reconciler cleans that secret.

mod password;
mod watched;

pub use password::{OperatorPasswordGenerator, PasswordGenerator, VaultPasswordGenerator};
pub use watched::{watch_secret, WatchedSecret};

use crate::crd::VaultConfig;
use crate::provider::{SecretFields, SecretStore, SecretStoreError};
use crate::templates::vault as vault_templates;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Shape of one named credential set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialKind {
    /// `{username, password}`; the username comes from `local_key`
    Account { local_key: &'static str },
    /// One field holding `name:password,...`; names come from `local_key`
    AdditionalUsers {
        local_key: &'static str,
        field: &'static str,
    },
}

/// A credential set stored at `{service}.{namespace}/{secret}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPlan {
    pub secret: &'static str,
    pub kind: CredentialKind,
}

impl CredentialPlan {
    pub const fn account(secret: &'static str, local_key: &'static str) -> Self {
        Self {
            secret,
            kind: CredentialKind::Account { local_key },
        }
    }

    pub const fn additional_users(
        secret: &'static str,
        local_key: &'static str,
        field: &'static str,
    ) -> Self {
        Self {
            secret,
            kind: CredentialKind::AdditionalUsers { local_key, field },
        }
    }
}

/// User names of a `name:password,...` list
pub fn user_names(users: &str) -> Vec<&str> {
    users
        .split(',')
        .map(|entry| entry.split(':').next().unwrap_or_default())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Vault operations for one component in one pass
#[derive(Debug)]
pub struct CredentialManager<'a> {
    store: Arc<dyn SecretStore>,
    vault: &'a VaultConfig,
    namespace: &'a str,
    refresh: bool,
}

impl<'a> CredentialManager<'a> {
    pub fn new(
        store: Arc<dyn SecretStore>,
        vault: &'a VaultConfig,
        namespace: &'a str,
        watched: &WatchedSecret,
    ) -> Self {
        Self {
            store,
            vault,
            namespace,
            refresh: watched.refresh_requested(),
        }
    }

    /// Write the ACL policy when it is missing or a refresh was requested
    pub async fn ensure_policy(&self, name: &str, policy: &str) -> Result<(), SecretStoreError> {
        let existing = self.store.read_policy(name).await?;
        if existing.is_none_or(|text| text.is_empty()) || self.refresh {
            info!("Writing Vault policy {}", name);
            self.store.write_policy(name, policy).await?;
        }
        Ok(())
    }

    /// Bind `service_account` to `policies` under role `name`, same trigger as policies
    pub async fn ensure_auth_role(
        &self,
        name: &str,
        service_account: &str,
        policies: &[String],
    ) -> Result<(), SecretStoreError> {
        let existing = self.store.read_auth_role(name).await?;
        if existing.is_none() || self.refresh {
            info!("Writing Vault auth role {}", name);
            let role = vault_templates::auth_role(service_account, self.namespace, policies);
            self.store.write_auth_role(name, &role).await?;
        }
        Ok(())
    }

    /// Generator chosen by the configured mechanism
    ///
    /// The password policy is named after the ensemble, so every component
    /// of one document shares it.
    pub async fn password_generator(
        &self,
        zookeeper_name: &str,
    ) -> Result<Box<dyn PasswordGenerator>, SecretStoreError> {
        if self.vault.uses_vault_generator() {
            let generator =
                VaultPasswordGenerator::new(self.store.clone(), zookeeper_name, self.namespace)
                    .await?;
            Ok(Box::new(generator))
        } else {
            Ok(Box::new(OperatorPasswordGenerator))
        }
    }

    /// Write a new version of a credential set when it is missing or a refresh was requested
    ///
    /// The new version number is recorded in `versions` under the secret's
    /// Vault name. Returns the version when one was written.
    pub async fn ensure_credential_secret(
        &self,
        service: &str,
        plan: &CredentialPlan,
        watched: &WatchedSecret,
        generator: &dyn PasswordGenerator,
        versions: &mut BTreeMap<String, u64>,
    ) -> Result<Option<u64>, SecretStoreError> {
        let secret_name = vault_templates::secret_name(service, self.namespace, plan.secret);
        let stored = self
            .store
            .read_secret(&self.vault.path, &secret_name)
            .await?;
        if stored.is_some() && !self.refresh {
            return Ok(None);
        }
        info!("Updating credentials {}", secret_name);

        let fields = match &plan.kind {
            CredentialKind::Account { local_key } => {
                let username = watched
                    .get_str(local_key)
                    .or_else(|| stored.as_ref()?.get("username").cloned())
                    .unwrap_or_default();
                let password = if username.is_empty() {
                    String::new()
                } else {
                    generator.generate().await?.to_string()
                };
                SecretFields::from([
                    ("username".to_string(), username),
                    ("password".to_string(), password),
                ])
            }
            CredentialKind::AdditionalUsers { local_key, field } => {
                let users = watched
                    .get_str(local_key)
                    .or_else(|| stored.as_ref()?.get(*field).cloned())
                    .unwrap_or_default();
                let mut entries = Vec::new();
                for name in user_names(&users) {
                    let password = generator.generate().await?;
                    entries.push(format!("{name}:{}", password.as_str()));
                }
                SecretFields::from([(field.to_string(), entries.join(","))])
            }
        };

        let version = self
            .store
            .write_secret(&self.vault.path, &secret_name, &fields)
            .await?;
        info!("Secret {} was updated, new version is {}", secret_name, version);
        versions.insert(secret_name, version);
        Ok(Some(version))
    }
}
