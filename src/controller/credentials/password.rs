//! # Password Generation
//!
//! Both generators follow the same rules: 10 characters with at least 3
//! lowercase, 3 uppercase, 1 digit and 1 of `_!`.

use crate::provider::{SecretStore, SecretStoreError};
use crate::templates::vault as vault_templates;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use tracing::info;
use zeroize::Zeroizing;

const PASSWORD_LENGTH: usize = 10;
const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SPECIAL: &[u8] = b"_!";

/// (charset, minimum occurrences)
const RULES: [(&[u8], usize); 4] = [(LOWERCASE, 3), (UPPERCASE, 3), (DIGITS, 1), (SPECIAL, 1)];

#[async_trait]
pub trait PasswordGenerator: Send + Sync {
    async fn generate(&self) -> Result<Zeroizing<String>, SecretStoreError>;
}

/// Generates passwords in the operator process
#[derive(Debug, Default, Clone, Copy)]
pub struct OperatorPasswordGenerator;

impl OperatorPasswordGenerator {
    pub fn generate_local(&self) -> Zeroizing<String> {
        let mut rng = rand::thread_rng();
        let alphabet: Vec<u8> = RULES.iter().flat_map(|(set, _)| set.iter().copied()).collect();

        let mut chars: Vec<u8> = Vec::with_capacity(PASSWORD_LENGTH);
        for (set, minimum) in RULES {
            for _ in 0..minimum {
                chars.push(set[rng.gen_range(0..set.len())]);
            }
        }
        while chars.len() < PASSWORD_LENGTH {
            chars.push(alphabet[rng.gen_range(0..alphabet.len())]);
        }
        chars.shuffle(&mut rng);
        Zeroizing::new(chars.into_iter().map(char::from).collect())
    }
}

#[async_trait]
impl PasswordGenerator for OperatorPasswordGenerator {
    async fn generate(&self) -> Result<Zeroizing<String>, SecretStoreError> {
        Ok(self.generate_local())
    }
}

/// Generates passwords from a Vault password policy
#[derive(Debug)]
pub struct VaultPasswordGenerator {
    store: Arc<dyn SecretStore>,
    policy_name: String,
}

impl VaultPasswordGenerator {
    /// Write the password policy for `service` and generate against it
    pub async fn new(
        store: Arc<dyn SecretStore>,
        service: &str,
        namespace: &str,
    ) -> Result<Self, SecretStoreError> {
        let policy_name = vault_templates::password_policy_name(service, namespace);
        info!("Writing password policy {}", policy_name);
        store
            .write_password_policy(&policy_name, vault_templates::PASSWORD_POLICY)
            .await?;
        Ok(Self { store, policy_name })
    }
}

#[async_trait]
impl PasswordGenerator for VaultPasswordGenerator {
    async fn generate(&self) -> Result<Zeroizing<String>, SecretStoreError> {
        self.store.generate_password(&self.policy_name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(password: &str, set: &[u8]) -> usize {
        password.bytes().filter(|b| set.contains(b)).count()
    }

    #[test]
    fn local_passwords_follow_the_rules() {
        let generator = OperatorPasswordGenerator;
        for _ in 0..200 {
            let password = generator.generate_local();
            assert_eq!(password.len(), PASSWORD_LENGTH);
            assert!(count(&password, LOWERCASE) >= 3);
            assert!(count(&password, UPPERCASE) >= 3);
            assert!(count(&password, DIGITS) >= 1);
            assert!(count(&password, SPECIAL) >= 1);
        }
    }

    #[test]
    fn local_passwords_differ() {
        let generator = OperatorPasswordGenerator;
        assert_ne!(*generator.generate_local(), *generator.generate_local());
    }
}
