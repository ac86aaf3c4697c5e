//! # Resource Applier
//!
//! Idempotent create-or-update primitives over the [`ObjectStore`].
//!
//! Every object written through the applier carries a controller owner
//! reference to the `ZooKeeperService` so the platform garbage-collects it
//! with the document. Operations are single-object; nothing is transactional
//! across objects.

use crate::controller::error::StoreError;
use crate::controller::store::{ObjectStore, StoreObject};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// A managed object kind the applier can write
///
/// `carry_over` copies server-assigned fields from the live object onto the
/// desired one before an update.
pub trait Managed: StoreObject {
    fn carry_over(&mut self, _live: &Self) {}
}

impl Managed for Service {
    fn carry_over(&mut self, live: &Self) {
        let live_spec = live.spec.as_ref();
        // Headless services keep "None"; allocated addresses must not change
        let keeps_address = live_spec
            .and_then(|spec| spec.type_.as_deref())
            .is_none_or(|service_type| service_type == "ClusterIP");
        if !keeps_address {
            return;
        }
        if let (Some(spec), Some(cluster_ip)) = (
            self.spec.as_mut(),
            live_spec.and_then(|spec| spec.cluster_ip.clone()),
        ) {
            spec.cluster_ip = Some(cluster_ip);
        }
    }
}

impl Managed for Deployment {}
impl Managed for ServiceAccount {}
impl Managed for PersistentVolumeClaim {}

/// Applies objects into one namespace on behalf of one owner
#[derive(Debug)]
pub struct ResourceApplier<'a, S: ObjectStore> {
    store: &'a S,
    namespace: String,
    owner: Option<OwnerReference>,
}

impl<'a, S: ObjectStore> ResourceApplier<'a, S> {
    pub fn new(store: &'a S, namespace: impl Into<String>, owner: Option<OwnerReference>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            owner,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn adopt<K: StoreObject>(&self, object: &mut K) {
        let Some(owner) = &self.owner else {
            return;
        };
        let references = object.owner_references_mut();
        if !references.iter().any(|existing| existing.uid == owner.uid) {
            references.push(owner.clone());
        }
    }

    /// Create the object, or update the live one in place
    ///
    /// A concurrent creation that wins the race is not an error; the next
    /// pass updates the object.
    pub async fn create_or_update<K: Managed>(&self, mut desired: K) -> Result<(), StoreError> {
        let name = desired.name_any();
        let kind = K::kind(&());
        self.adopt(&mut desired);

        match self.store.get::<K>(&self.namespace, &name).await? {
            None => {
                info!("Creating {} {}/{}", kind, self.namespace, name);
                match self.store.create(&self.namespace, &desired).await {
                    Ok(_) => Ok(()),
                    Err(StoreError::AlreadyExists { .. }) => {
                        warn!(
                            "{} {}/{} was created concurrently, it will be updated on the next pass",
                            kind, self.namespace, name
                        );
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            Some(live) => {
                debug!("Updating {} {}/{}", kind, self.namespace, name);
                desired.meta_mut().resource_version = live.resource_version();
                desired.carry_over(&live);
                self.store.update(&self.namespace, &desired).await?;
                Ok(())
            }
        }
    }

    /// Create the object only when no object with its name exists
    ///
    /// Used for objects whose spec is immutable once created.
    pub async fn create_if_absent<K: Managed>(&self, mut desired: K) -> Result<(), StoreError> {
        let name = desired.name_any();
        if self.store.get::<K>(&self.namespace, &name).await?.is_some() {
            debug!("{} {}/{} already exists", K::kind(&()), self.namespace, name);
            return Ok(());
        }
        info!("Creating {} {}/{}", K::kind(&()), self.namespace, name);
        self.adopt(&mut desired);
        match self.store.create(&self.namespace, &desired).await {
            Ok(_) | Err(StoreError::AlreadyExists { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn find<K: StoreObject>(&self, name: &str) -> Result<Option<K>, StoreError> {
        self.store.get(&self.namespace, name).await
    }

    pub async fn list<K: StoreObject>(
        &self,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<K>, StoreError> {
        self.store.list(&self.namespace, selector).await
    }

    /// Set the replica count of an existing deployment
    ///
    /// A missing deployment is left alone.
    pub async fn scale_deployment(&self, name: &str, replicas: i32) -> Result<(), StoreError> {
        info!(
            "Scaling Deployment {}/{} to {} replicas",
            self.namespace, name, replicas
        );
        let Some(mut deployment) = self.store.get::<Deployment>(&self.namespace, name).await?
        else {
            warn!("Deployment {}/{} not found, nothing to scale", self.namespace, name);
            return Ok(());
        };
        if let Some(spec) = deployment.spec.as_mut() {
            spec.replicas = Some(replicas);
        }
        self.store.update(&self.namespace, &deployment).await?;
        Ok(())
    }
}
