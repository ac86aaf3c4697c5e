//! Shared fakes for the reconciliation tests
//!
//! - [`FakeStore`]: in-memory object store that records every call. Applying
//!   a deployment with a non-zero replica count creates one pod from its
//!   template labels and marks the deployment ready; scaling to zero removes
//!   the pod.
//! - [`FakeSecretStore`]: in-memory Vault with versioned KV secrets
//! - [`FakeConnector`]: hands out the fake Vault after the real parameter check

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::ObjectMeta;
use kube::Resource;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use zeroize::Zeroizing;
use zookeeper_operator::config::ControllerConfig;
use zookeeper_operator::controller::store::{ObjectStore, StoreObject};
use zookeeper_operator::controller::{ServiceController, StoreError};
use zookeeper_operator::crd::{
    GlobalConfig, PodSettings, StorageConfig, VaultConfig, ZooKeeperConfig, ZooKeeperService,
    ZooKeeperServiceSpec,
};
use zookeeper_operator::provider::{
    check_connection_parameters, SecretFields, SecretStore, SecretStoreConnector,
    SecretStoreError,
};

pub const NAMESPACE: &str = "zookeeper-service";
pub const NAME: &str = "zk";
pub const SECRET: &str = "zk-secret";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    List,
    Create,
    Update,
    UpdateStatus,
}

/// One recorded store call; `name` is the label selector for lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub verb: Verb,
    pub kind: String,
    pub name: String,
    /// `spec.replicas` of a written deployment
    pub replicas: Option<i64>,
}

impl Call {
    pub fn is_write(&self) -> bool {
        matches!(self.verb, Verb::Create | Verb::Update | Verb::UpdateStatus)
    }
}

#[derive(Debug, Default)]
struct StoreState {
    objects: BTreeMap<(String, String, String), Value>,
    calls: Vec<Call>,
    version: u64,
    pods_pending: bool,
    deployments_unready: bool,
}

impl StoreState {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    fn record(&mut self, verb: Verb, kind: &str, name: &str, object: Option<&Value>) {
        let replicas = object
            .filter(|_| kind == "Deployment")
            .and_then(|value| value.pointer("/spec/replicas"))
            .and_then(Value::as_i64);
        self.calls.push(Call {
            verb,
            kind: kind.to_string(),
            name: name.to_string(),
            replicas,
        });
    }

    /// Store `value`, assigning identity fields and simulating workloads
    fn put(&mut self, kind: &str, namespace: &str, mut value: Value) -> Value {
        let name = value
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let version = self.next_version();
        let metadata = &mut value["metadata"];
        metadata["namespace"] = json!(namespace);
        metadata["resourceVersion"] = json!(version);
        if metadata.get("uid").is_none_or(Value::is_null) {
            metadata["uid"] = json!(format!("uid-{kind}-{name}"));
        }
        if kind == "Deployment" {
            self.simulate_workload(namespace, &name, &mut value);
        }
        self.objects
            .insert((kind.to_string(), namespace.to_string(), name), value.clone());
        value
    }

    fn simulate_workload(&mut self, namespace: &str, name: &str, deployment: &mut Value) {
        let replicas = deployment
            .pointer("/spec/replicas")
            .and_then(Value::as_i64)
            .unwrap_or(1);
        let pod_key = ("Pod".to_string(), namespace.to_string(), format!("{name}-pod"));
        if replicas > 0 {
            let labels = deployment
                .pointer("/spec/template/metadata/labels")
                .cloned()
                .unwrap_or_else(|| json!({}));
            let phase = if self.pods_pending { "Pending" } else { "Running" };
            let version = self.next_version();
            self.objects.insert(
                pod_key.clone(),
                json!({
                    "apiVersion": "v1",
                    "kind": "Pod",
                    "metadata": {
                        "name": pod_key.2,
                        "namespace": namespace,
                        "labels": labels,
                        "resourceVersion": version,
                    },
                    "status": { "phase": phase },
                }),
            );
        } else {
            self.objects.remove(&pod_key);
        }
        let ready = if self.deployments_unready { 0 } else { replicas };
        deployment["status"] = json!({
            "replicas": replicas,
            "readyReplicas": ready,
            "updatedReplicas": ready,
        });
    }
}

fn kind_of<K: StoreObject>() -> String {
    K::kind(&()).to_string()
}

fn matches_selector(value: &Value, selector: &BTreeMap<String, String>) -> bool {
    let labels = value.pointer("/metadata/labels");
    selector.iter().all(|(key, expected)| {
        labels
            .and_then(|labels| labels.get(key))
            .and_then(Value::as_str)
            == Some(expected.as_str())
    })
}

/// In-memory object store; clones share the same objects
#[derive(Debug, Default, Clone)]
pub struct FakeStore {
    state: Arc<Mutex<StoreState>>,
}

impl FakeStore {
    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().expect("fake store lock")
    }

    /// Insert an object without recording a call
    pub fn seed<K: StoreObject>(&self, object: &K) {
        let value = serde_json::to_value(object).expect("serializable object");
        self.state().put(&kind_of::<K>(), NAMESPACE, value);
    }

    pub fn object<K: StoreObject>(&self, name: &str) -> Option<K> {
        let key = (kind_of::<K>(), NAMESPACE.to_string(), name.to_string());
        self.state()
            .objects
            .get(&key)
            .map(|value| serde_json::from_value(value.clone()).expect("stored object"))
    }

    pub fn names<K: StoreObject>(&self) -> Vec<String> {
        let kind = kind_of::<K>();
        self.state()
            .objects
            .keys()
            .filter(|(k, _, _)| *k == kind)
            .map(|(_, _, name)| name.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn writes(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_write).collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// New pods stay `Pending`
    pub fn set_pods_pending(&self, pending: bool) {
        self.state().pods_pending = pending;
    }

    /// Applied deployments report zero ready replicas
    pub fn set_deployments_unready(&self, unready: bool) {
        self.state().deployments_unready = unready;
    }

    pub fn document(&self) -> ZooKeeperService {
        self.object(NAME).expect("document exists")
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn get<K: StoreObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, StoreError> {
        let kind = kind_of::<K>();
        let mut state = self.state();
        state.record(Verb::Get, &kind, name, None);
        state
            .objects
            .get(&(kind, namespace.to_string(), name.to_string()))
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn list<K: StoreObject>(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<K>, StoreError> {
        let kind = kind_of::<K>();
        let mut state = self.state();
        let selector_text = zookeeper_operator::controller::store::selector_string(selector);
        state.record(Verb::List, &kind, &selector_text, None);
        state
            .objects
            .iter()
            .filter(|((k, ns, _), value)| *k == kind && ns == namespace && matches_selector(value, selector))
            .map(|(_, value)| serde_json::from_value(value.clone()).map_err(StoreError::from))
            .collect()
    }

    async fn create<K: StoreObject>(&self, namespace: &str, object: &K) -> Result<K, StoreError> {
        let kind = kind_of::<K>();
        let value = serde_json::to_value(object)?;
        let name = object.meta().name.clone().unwrap_or_default();
        let mut state = self.state();
        state.record(Verb::Create, &kind, &name, Some(&value));
        let key = (kind.clone(), namespace.to_string(), name.clone());
        if state.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists { kind, name });
        }
        let stored = state.put(&kind, namespace, value);
        Ok(serde_json::from_value(stored)?)
    }

    async fn update<K: StoreObject>(&self, namespace: &str, object: &K) -> Result<K, StoreError> {
        let kind = kind_of::<K>();
        let mut value = serde_json::to_value(object)?;
        let name = object.meta().name.clone().unwrap_or_default();
        let mut state = self.state();
        state.record(Verb::Update, &kind, &name, Some(&value));
        let key = (kind.clone(), namespace.to_string(), name.clone());
        let Some(existing) = state.objects.get(&key) else {
            return Err(StoreError::Api {
                kind,
                name,
                code: 404,
                message: "not found".to_string(),
            });
        };
        // Replace never touches the status subresource
        if kind == "ZooKeeperService" {
            value["status"] = existing.get("status").cloned().unwrap_or(Value::Null);
        }
        let stored = state.put(&kind, namespace, value);
        Ok(serde_json::from_value(stored)?)
    }

    async fn update_status<K: StoreObject>(
        &self,
        namespace: &str,
        object: &K,
    ) -> Result<K, StoreError> {
        let kind = kind_of::<K>();
        let value = serde_json::to_value(object)?;
        let name = object.meta().name.clone().unwrap_or_default();
        let mut state = self.state();
        state.record(Verb::UpdateStatus, &kind, &name, None);
        let key = (kind.clone(), namespace.to_string(), name.clone());
        let version = state.next_version();
        let Some(existing) = state.objects.get_mut(&key) else {
            return Err(StoreError::Api {
                kind,
                name,
                code: 404,
                message: "not found".to_string(),
            });
        };
        existing["status"] = value.get("status").cloned().unwrap_or(Value::Null);
        existing["metadata"]["resourceVersion"] = json!(version);
        Ok(serde_json::from_value(existing.clone())?)
    }
}

#[derive(Debug, Default)]
struct VaultState {
    secrets: BTreeMap<String, Vec<SecretFields>>,
    policies: BTreeMap<String, String>,
    roles: BTreeMap<String, Value>,
    password_policies: BTreeMap<String, String>,
    generated: u64,
}

/// In-memory Vault
#[derive(Debug, Default)]
pub struct FakeSecretStore {
    state: Mutex<VaultState>,
}

impl FakeSecretStore {
    fn state(&self) -> MutexGuard<'_, VaultState> {
        self.state.lock().expect("fake vault lock")
    }

    /// Every stored version of `{path}/{name}`, oldest first
    pub fn versions(&self, path: &str, name: &str) -> Vec<SecretFields> {
        self.state()
            .secrets
            .get(&format!("{path}/{name}"))
            .cloned()
            .unwrap_or_default()
    }

    pub fn secret_paths(&self) -> Vec<String> {
        self.state().secrets.keys().cloned().collect()
    }

    pub fn policy(&self, name: &str) -> Option<String> {
        self.state().policies.get(name).cloned()
    }

    pub fn role(&self, name: &str) -> Option<Value> {
        self.state().roles.get(name).cloned()
    }

    pub fn has_password_policy(&self, name: &str) -> bool {
        self.state().password_policies.contains_key(name)
    }
}

#[async_trait]
impl SecretStore for FakeSecretStore {
    async fn read_secret(
        &self,
        path: &str,
        name: &str,
    ) -> Result<Option<SecretFields>, SecretStoreError> {
        Ok(self
            .state()
            .secrets
            .get(&format!("{path}/{name}"))
            .and_then(|versions| versions.last().cloned()))
    }

    async fn write_secret(
        &self,
        path: &str,
        name: &str,
        fields: &SecretFields,
    ) -> Result<u64, SecretStoreError> {
        let mut state = self.state();
        let versions = state.secrets.entry(format!("{path}/{name}")).or_default();
        versions.push(fields.clone());
        Ok(versions.len() as u64)
    }

    async fn read_policy(&self, name: &str) -> Result<Option<String>, SecretStoreError> {
        Ok(self.policy(name))
    }

    async fn write_policy(&self, name: &str, policy: &str) -> Result<(), SecretStoreError> {
        self.state()
            .policies
            .insert(name.to_string(), policy.to_string());
        Ok(())
    }

    async fn read_auth_role(&self, name: &str) -> Result<Option<Value>, SecretStoreError> {
        Ok(self.role(name))
    }

    async fn write_auth_role(&self, name: &str, role: &Value) -> Result<(), SecretStoreError> {
        self.state().roles.insert(name.to_string(), role.clone());
        Ok(())
    }

    async fn write_password_policy(&self, name: &str, policy: &str) -> Result<(), SecretStoreError> {
        self.state()
            .password_policies
            .insert(name.to_string(), policy.to_string());
        Ok(())
    }

    async fn generate_password(
        &self,
        policy_name: &str,
    ) -> Result<Zeroizing<String>, SecretStoreError> {
        let mut state = self.state();
        if !state.password_policies.contains_key(policy_name) {
            return Err(SecretStoreError::Status {
                path: policy_name.to_string(),
                status: 404,
                body: "no password policy".to_string(),
            });
        }
        state.generated += 1;
        Ok(Zeroizing::new(format!("Gen_{}aB1", state.generated)))
    }
}

/// Connector returning the shared fake Vault
#[derive(Debug, Default)]
pub struct FakeConnector {
    pub vault: Arc<FakeSecretStore>,
}

#[async_trait]
impl SecretStoreConnector for FakeConnector {
    async fn connect(&self, config: &VaultConfig) -> Result<Arc<dyn SecretStore>, SecretStoreError> {
        check_connection_parameters(config)?;
        Ok(self.vault.clone())
    }
}

/// Millisecond waits so full passes run quickly
pub fn fast_config() -> ControllerConfig {
    ControllerConfig {
        poll_interval: Duration::from_millis(5),
        peer_timeout: Duration::from_millis(200),
        settle_delay: Duration::from_millis(1),
        ..ControllerConfig::default()
    }
}

pub fn controller(store: FakeStore, connector: Arc<FakeConnector>) -> ServiceController<FakeStore> {
    ServiceController::new(store, fast_config(), connector)
}

/// Ensemble of `replicas` peers with per-peer storage by class
pub fn ensemble_document(replicas: i32) -> ZooKeeperService {
    let mut document = ZooKeeperService::new(
        NAME,
        ZooKeeperServiceSpec {
            global: GlobalConfig {
                wait_for_pods_ready: true,
                pod_readiness_timeout: 1,
                ..GlobalConfig::default()
            },
            zoo_keeper: Some(ZooKeeperConfig {
                pod: PodSettings {
                    docker_image: "zookeeper:3.8".to_string(),
                    ..PodSettings::default()
                },
                replicas,
                storage: StorageConfig {
                    class_name: vec!["standard".to_string()],
                    size: "1Gi".to_string(),
                    ..StorageConfig::default()
                },
                heap_size: 256,
                secret_name: SECRET.to_string(),
                ..ZooKeeperConfig::default()
            }),
            ..ZooKeeperServiceSpec::default()
        },
    );
    document.metadata.namespace = Some(NAMESPACE.to_string());
    document
}

pub fn vault_config() -> VaultConfig {
    VaultConfig {
        enabled: true,
        url: "http://vault:8200".to_string(),
        method: "kubernetes".to_string(),
        role: "zookeeper-operator".to_string(),
        path: "secret".to_string(),
        write_policies: true,
        ..VaultConfig::default()
    }
}

/// Local credential secret holding the given string data
pub fn credential_secret(data: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(SECRET.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..ObjectMeta::default()
        },
        data: Some(
            data.iter()
                .map(|(key, value)| {
                    (
                        key.to_string(),
                        k8s_openapi::ByteString(value.as_bytes().to_vec()),
                    )
                })
                .collect(),
        ),
        ..Secret::default()
    }
}

/// Store seeded with `document` and the default credential secret
pub fn seeded_store(document: &ZooKeeperService) -> FakeStore {
    let store = FakeStore::default();
    store.seed(document);
    store.seed(&credential_secret(&[
        ("admin-username", "admin"),
        ("client-username", "client"),
    ]));
    store
}

/// Ordered create/update calls for deployments as `(verb, name, replicas)`
pub fn deployment_writes(calls: &[Call]) -> Vec<(Verb, String, Option<i64>)> {
    calls
        .iter()
        .filter(|call| call.kind == "Deployment" && call.is_write())
        .map(|call| (call.verb, call.name.clone(), call.replicas))
        .collect()
}
