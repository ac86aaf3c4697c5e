//! # Change Detection Cache
//!
//! Per-document memory of what the last successful pass applied.
//!
//! The cache lives in the controller process only. A restart starts with an
//! empty cache, which makes every component re-apply its resources once.

use crate::controller::credentials::WatchedSecret;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;

/// Key for the hash of the whole desired-state document
pub const SPEC_HASH_KEY: &str = "spec";
/// Key for the hash of the global subtree
pub const GLOBAL_HASH_KEY: &str = "spec.global";
pub const ZOOKEEPER_HASH_KEY: &str = "spec.zookeeper";
pub const MONITORING_HASH_KEY: &str = "spec.monitoring";
pub const BACKUP_DAEMON_HASH_KEY: &str = "spec.backupDaemon";

/// Hashes of applied subtrees and versions of watched secrets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeDetectionCache {
    resource_hashes: HashMap<String, String>,
    resource_versions: HashMap<String, String>,
}

impl ChangeDetectionCache {
    pub fn hash(&self, key: &str) -> Option<&str> {
        self.resource_hashes.get(key).map(String::as_str)
    }

    pub fn set_hash(&mut self, key: &str, hash: impl Into<String>) {
        self.resource_hashes.insert(key.to_string(), hash.into());
    }

    /// Drop a recorded hash so the next pass treats that input as changed
    pub fn forget_hash(&mut self, key: &str) {
        self.resource_hashes.remove(key);
    }

    /// Last seen resource version of a watched secret
    pub fn version(&self, secret_name: &str) -> Option<&str> {
        self.resource_versions.get(secret_name).map(String::as_str)
    }

    pub fn set_version(&mut self, secret_name: &str, version: impl Into<String>) {
        self.resource_versions
            .insert(secret_name.to_string(), version.into());
    }

    /// Record the watched secret's current version
    pub fn remember_secret(&mut self, watched: &WatchedSecret) {
        if !watched.is_placeholder() {
            self.set_version(watched.name(), watched.resource_version());
        }
    }

    /// Whether the last pass already applied this subtree against this secret
    ///
    /// Requires the component hash, the global hash and the watched secret's
    /// resource version to all match what was recorded. A placeholder secret
    /// has no version and never counts as a change.
    pub fn is_unchanged(
        &self,
        component_key: &str,
        component_hash: &str,
        global_hash: &str,
        watched: &WatchedSecret,
    ) -> bool {
        self.hash(component_key) == Some(component_hash)
            && self.hash(GLOBAL_HASH_KEY) == Some(global_hash)
            && (watched.is_placeholder()
                || self.version(watched.name()) == Some(watched.resource_version()))
    }
}

/// Caches for every document this process reconciles, keyed by `namespace/name`
///
/// A pass checks its cache out and puts it back when it finishes, so the
/// lock is never held across an await point.
#[derive(Debug, Default)]
pub struct CacheRegistry {
    caches: Mutex<HashMap<String, ChangeDetectionCache>>,
}

impl CacheRegistry {
    pub fn checkout(&self, key: &str) -> ChangeDetectionCache {
        match self.caches.lock() {
            Ok(caches) => caches.get(key).cloned().unwrap_or_default(),
            Err(e) => {
                warn!("Failed to lock change detection caches: {}, starting cold", e);
                ChangeDetectionCache::default()
            }
        }
    }

    pub fn checkin(&self, key: &str, cache: ChangeDetectionCache) {
        match self.caches.lock() {
            Ok(mut caches) => {
                caches.insert(key.to_string(), cache);
            }
            Err(e) => warn!("Failed to lock change detection caches: {}", e),
        }
    }

    /// Drop the cache for a deleted document
    pub fn forget(&self, key: &str) {
        if let Ok(mut caches) = self.caches.lock() {
            caches.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Secret;
    use kube::api::ObjectMeta;

    fn watched(name: &str, version: &str) -> WatchedSecret {
        WatchedSecret::new(Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                resource_version: Some(version.to_string()),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    #[test]
    fn unchanged_requires_all_three_inputs() {
        let secret = watched("zk-secret", "7");
        let mut cache = ChangeDetectionCache::default();
        assert!(!cache.is_unchanged(ZOOKEEPER_HASH_KEY, "h", "g", &secret));

        cache.set_hash(ZOOKEEPER_HASH_KEY, "h");
        cache.set_hash(GLOBAL_HASH_KEY, "g");
        assert!(!cache.is_unchanged(ZOOKEEPER_HASH_KEY, "h", "g", &secret));

        cache.remember_secret(&secret);
        assert!(cache.is_unchanged(ZOOKEEPER_HASH_KEY, "h", "g", &secret));
        assert!(!cache.is_unchanged(ZOOKEEPER_HASH_KEY, "h", "g2", &secret));
        assert!(!cache.is_unchanged(ZOOKEEPER_HASH_KEY, "h", "g", &watched("zk-secret", "8")));
    }

    #[test]
    fn placeholder_secret_only_needs_hashes() {
        let placeholder = WatchedSecret::placeholder();
        let mut cache = ChangeDetectionCache::default();
        cache.set_hash(MONITORING_HASH_KEY, "h");
        cache.set_hash(GLOBAL_HASH_KEY, "g");
        assert!(cache.is_unchanged(MONITORING_HASH_KEY, "h", "g", &placeholder));
        cache.remember_secret(&placeholder);
        assert_eq!(cache.version(""), None);
    }

    #[test]
    fn registry_round_trips_per_document() {
        let registry = CacheRegistry::default();
        let mut cache = registry.checkout("ns/zk");
        cache.set_hash(SPEC_HASH_KEY, "abc");
        registry.checkin("ns/zk", cache);

        assert_eq!(registry.checkout("ns/zk").hash(SPEC_HASH_KEY), Some("abc"));
        assert_eq!(registry.checkout("ns/other").hash(SPEC_HASH_KEY), None);

        let mut cache = registry.checkout("ns/zk");
        cache.forget_hash(SPEC_HASH_KEY);
        assert_eq!(cache.hash(SPEC_HASH_KEY), None);

        registry.forget("ns/zk");
        assert_eq!(registry.checkout("ns/zk").hash(SPEC_HASH_KEY), None);
    }
}
