//! # Object Store
//!
//! Typed access to namespaced Kubernetes objects.
//!
//! Reconcilers only talk to the cluster through [`ObjectStore`], so the whole
//! reconciliation flow can run against an in-memory store in tests.
//! [`KubeStore`] is the production implementation backed by `kube::Api`.

use crate::constants::FIELD_MANAGER;
use crate::controller::error::StoreError;
use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::debug;

/// Namespaced object kinds the operator reads and writes
pub trait StoreObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> StoreObject for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Typed object store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch by name; `None` when absent
    async fn get<K: StoreObject>(&self, namespace: &str, name: &str)
        -> Result<Option<K>, StoreError>;

    /// List objects whose labels contain every selector pair
    async fn list<K: StoreObject>(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<K>, StoreError>;

    /// Create; [`StoreError::AlreadyExists`] when the name is taken
    async fn create<K: StoreObject>(&self, namespace: &str, object: &K) -> Result<K, StoreError>;

    /// Replace an existing object
    async fn update<K: StoreObject>(&self, namespace: &str, object: &K) -> Result<K, StoreError>;

    /// Write the status subresource from `object`
    async fn update_status<K: StoreObject>(
        &self,
        namespace: &str,
        object: &K,
    ) -> Result<K, StoreError>;
}

/// Format a label selector as `key=value,key=value`
pub fn selector_string(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Kubernetes-backed object store
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: StoreObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn api_error<K: StoreObject>(name: &str, error: kube::Error) -> StoreError {
    match error {
        kube::Error::Api(api_err) if api_err.code == 409 => StoreError::AlreadyExists {
            kind: K::kind(&()).to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(api_err) => StoreError::Api {
            kind: K::kind(&()).to_string(),
            name: name.to_string(),
            code: api_err.code,
            message: api_err.message.clone(),
        },
        other => StoreError::Kube(other),
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: StoreObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, StoreError> {
        match self.api::<K>(namespace).get(name).await {
            Ok(object) => Ok(Some(object)),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(None),
            Err(e) => Err(api_error::<K>(name, e)),
        }
    }

    async fn list<K: StoreObject>(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<K>, StoreError> {
        let params = ListParams::default().labels(&selector_string(selector));
        let list = self
            .api::<K>(namespace)
            .list(&params)
            .await
            .map_err(|e| api_error::<K>("<list>", e))?;
        Ok(list.items)
    }

    async fn create<K: StoreObject>(&self, namespace: &str, object: &K) -> Result<K, StoreError> {
        let name = object.name_any();
        debug!("Creating {} {}/{}", K::kind(&()), namespace, name);
        self.api::<K>(namespace)
            .create(&PostParams::default(), object)
            .await
            .map_err(|e| api_error::<K>(&name, e))
    }

    async fn update<K: StoreObject>(&self, namespace: &str, object: &K) -> Result<K, StoreError> {
        let name = object.name_any();
        debug!("Updating {} {}/{}", K::kind(&()), namespace, name);
        self.api::<K>(namespace)
            .replace(&name, &PostParams::default(), object)
            .await
            .map_err(|e| api_error::<K>(&name, e))
    }

    async fn update_status<K: StoreObject>(
        &self,
        namespace: &str,
        object: &K,
    ) -> Result<K, StoreError> {
        let name = object.name_any();
        let status = serde_json::to_value(object)?
            .get("status")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let patch = serde_json::json!({ "status": status });
        self.api::<K>(namespace)
            .patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
            .map_err(|e| api_error::<K>(&name, e))
    }
}
