//! # Watched Secret
//!
//! The local secret a component takes ownership of. In delegated mode it is
//! only a signalling object: the refresh annotation requests rotation and
//! its data is cleared once the credentials live in Vault.

use crate::constants::REFRESH_CREDENTIALS_ANNOTATION;
use crate::controller::error::{ReconcilerError, StoreError};
use crate::controller::store::ObjectStore;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct WatchedSecret {
    secret: Secret,
}

impl WatchedSecret {
    pub fn new(secret: Secret) -> Self {
        Self { secret }
    }

    /// Stand-in used when no local secret exists
    pub fn placeholder() -> Self {
        Self {
            secret: Secret::default(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.name().is_empty()
    }

    pub fn name(&self) -> &str {
        self.secret.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn resource_version(&self) -> &str {
        self.secret
            .metadata
            .resource_version
            .as_deref()
            .unwrap_or_default()
    }

    /// Whether the refresh annotation is set to `"true"`
    pub fn refresh_requested(&self) -> bool {
        self.secret
            .annotations()
            .get(REFRESH_CREDENTIALS_ANNOTATION)
            .is_some_and(|value| value == "true")
    }

    /// Non-empty UTF-8 value stored under `key`
    pub fn get_str(&self, key: &str) -> Option<String> {
        let value = self.secret.data.as_ref()?.get(key)?;
        let value = String::from_utf8(value.0.clone()).ok()?;
        (!value.is_empty()).then_some(value)
    }

    /// Whether the secret still carries data or an unprocessed refresh request
    pub fn needs_cleaning(&self) -> bool {
        !self.is_placeholder() && (self.secret.data.is_some() || self.refresh_requested())
    }

    /// Reset the refresh annotation and drop the data
    pub async fn clean<S: ObjectStore>(
        &mut self,
        store: &S,
        namespace: &str,
    ) -> Result<(), StoreError> {
        info!("Cleaning data of [{}] secret", self.name());
        let mut secret = self.secret.clone();
        secret
            .annotations_mut()
            .insert(REFRESH_CREDENTIALS_ANNOTATION.to_string(), "false".to_string());
        secret.data = None;
        secret.string_data = None;
        self.secret = store.update(namespace, &secret).await?;
        Ok(())
    }
}

fn api_group(api_version: &str) -> &str {
    match api_version.split_once('/') {
        Some((group, _)) => group,
        None => "",
    }
}

fn same_object(reference: &OwnerReference, owner: &OwnerReference) -> bool {
    api_group(&reference.api_version) == api_group(&owner.api_version)
        && reference.kind == owner.kind
        && reference.name == owner.name
}

/// Point the controller reference of `references` at `owner`
///
/// A controller reference to another object is dropped together with the
/// rest of the list.
fn set_controller_reference(references: &mut Vec<OwnerReference>, owner: &OwnerReference) {
    let foreign_controller = references
        .iter()
        .any(|r| r.controller == Some(true) && !same_object(r, owner));
    if foreign_controller {
        references.clear();
    }
    match references.iter_mut().find(|r| same_object(r, owner)) {
        Some(existing) => *existing = owner.clone(),
        None => references.push(owner.clone()),
    }
}

/// Find the component's secret and take ownership of it
///
/// An undeclared secret, or one missing in delegated mode, yields a
/// placeholder. In static mode a declared secret must exist.
pub async fn watch_secret<S: ObjectStore>(
    store: &S,
    namespace: &str,
    name: &str,
    owner: &OwnerReference,
    delegated: bool,
) -> Result<WatchedSecret, ReconcilerError> {
    if name.is_empty() {
        return Ok(WatchedSecret::placeholder());
    }
    let Some(mut secret) = store.get::<Secret>(namespace, name).await? else {
        if delegated {
            info!(
                "Secret [{}] has been removed, cannot watch it to rotate credentials",
                name
            );
            return Ok(WatchedSecret::placeholder());
        }
        return Err(ReconcilerError::Configuration(format!(
            "secret '{name}' must exist"
        )));
    };

    let before = secret.metadata.owner_references.clone();
    let references = secret.owner_references_mut();
    set_controller_reference(references, owner);
    if secret.metadata.owner_references == before {
        debug!("Secret [{}] is already owned", name);
        return Ok(WatchedSecret::new(secret));
    }
    info!("Taking ownership of secret [{}]", name);
    let secret = store.update(namespace, &secret).await?;
    Ok(WatchedSecret::new(secret))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn owner(name: &str) -> OwnerReference {
        OwnerReference {
            api_version: "qubership.org/v1".into(),
            kind: "ZooKeeperService".into(),
            name: name.into(),
            uid: format!("uid-{name}"),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    fn secret(annotations: &[(&str, &str)], data: &[(&str, &str)]) -> WatchedSecret {
        WatchedSecret::new(Secret {
            metadata: ObjectMeta {
                name: Some("zk-secret".into()),
                annotations: Some(
                    annotations
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            data: (!data.is_empty()).then(|| {
                data.iter()
                    .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect::<BTreeMap<_, _>>()
            }),
            ..Default::default()
        })
    }

    #[test]
    fn refresh_needs_literal_true() {
        assert!(secret(&[(REFRESH_CREDENTIALS_ANNOTATION, "true")], &[]).refresh_requested());
        assert!(!secret(&[(REFRESH_CREDENTIALS_ANNOTATION, "false")], &[]).refresh_requested());
        assert!(!secret(&[], &[]).refresh_requested());
    }

    #[test]
    fn empty_values_are_absent() {
        let watched = secret(&[], &[("admin-username", "admin"), ("client-username", "")]);
        assert_eq!(watched.get_str("admin-username").as_deref(), Some("admin"));
        assert_eq!(watched.get_str("client-username"), None);
        assert_eq!(watched.get_str("missing"), None);
    }

    #[test]
    fn cleaning_is_needed_for_data_or_refresh() {
        assert!(secret(&[], &[("username", "bd")]).needs_cleaning());
        assert!(secret(&[(REFRESH_CREDENTIALS_ANNOTATION, "true")], &[]).needs_cleaning());
        assert!(!secret(&[(REFRESH_CREDENTIALS_ANNOTATION, "false")], &[]).needs_cleaning());
        assert!(!WatchedSecret::placeholder().needs_cleaning());
    }

    #[test]
    fn foreign_controller_is_replaced() {
        let mut references = vec![
            OwnerReference {
                kind: "Deployment".into(),
                api_version: "apps/v1".into(),
                name: "other".into(),
                controller: Some(true),
                ..Default::default()
            },
            OwnerReference {
                kind: "ConfigMap".into(),
                api_version: "v1".into(),
                name: "cm".into(),
                ..Default::default()
            },
        ];
        set_controller_reference(&mut references, &owner("zk"));
        assert_eq!(references, vec![owner("zk")]);
    }

    #[test]
    fn existing_reference_is_kept_in_place() {
        let plain = OwnerReference {
            kind: "ConfigMap".into(),
            api_version: "v1".into(),
            name: "cm".into(),
            ..Default::default()
        };
        let mut references = vec![plain.clone(), owner("zk")];
        set_controller_reference(&mut references, &owner("zk"));
        assert_eq!(references, vec![plain, owner("zk")]);
    }
}
