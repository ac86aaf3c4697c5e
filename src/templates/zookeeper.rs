//! # Ensemble Templates
//!
//! Endpoints, claims and workloads of the coordination ensemble. Every
//! builder is a pure function of the document.

use super::common::{
    build_envs, claim_volume, container_port, default_container_security_context, deployment,
    empty_dir_volume, env, field_env, join_labels, labels, pinned_affinity, secret_env,
    secret_volume, service, service_account, service_port, volume_mount, Labels, TCP,
};
use super::storage::non_shared_claim;
use super::vault;
use crate::controller::error::ReconcilerError;
use crate::crd::{
    GlobalConfig, PersistentVolumeType, StorageConfig, VaultConfig, ZooKeeperConfig,
};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    Container, EnvVar, ExecAction, PersistentVolumeClaim, PodSpec, Probe, Service, ServiceAccount,
    Volume,
};

pub const CLIENT_PORT: i32 = 2181;
pub const NONENCRYPTED_CLIENT_PORT: i32 = 2182;
pub const FOLLOWERS_PORT: i32 = 2888;
pub const ELECTION_PORT: i32 = 3888;
pub const BACKUP_PORT: i32 = 8081;
pub const PROMETHEUS_PORT: i32 = 8080;

const DIAGNOSTIC_MODES: [&str; 2] = ["dev", "prod"];
const HEALTH_SCRIPT: &str = "./bin/zkHealth.sh";

/// Labels of every ensemble resource
pub fn zookeeper_labels(name: &str, default_labels: &Labels) -> Labels {
    join_labels(&[
        &labels([("app.kubernetes.io/name", name), ("name", name)]),
        &selector_labels(name),
        default_labels,
    ])
}

/// Labels that select the ensemble's pods
pub fn selector_labels(name: &str) -> Labels {
    labels([("component", "zookeeper"), ("clusterName", name)])
}

pub fn peer_name(name: &str, ordinal: u32) -> String {
    format!("{name}-{ordinal}")
}

pub fn peer_claim_name(name: &str, ordinal: u32) -> String {
    format!("pvc-{name}-{ordinal}")
}

pub fn domain_name(name: &str) -> String {
    format!("{name}-server")
}

/// Resource builders for one ensemble
#[derive(Debug, Clone, Copy)]
pub struct ZooKeeperTemplates<'a> {
    name: &'a str,
    namespace: &'a str,
    global: &'a GlobalConfig,
    zookeeper: &'a ZooKeeperConfig,
    vault: Option<&'a VaultConfig>,
}

impl<'a> ZooKeeperTemplates<'a> {
    /// `vault` is only honored when delegated credentials are enabled
    pub fn new(
        name: &'a str,
        namespace: &'a str,
        global: &'a GlobalConfig,
        zookeeper: &'a ZooKeeperConfig,
        vault: Option<&'a VaultConfig>,
    ) -> Self {
        Self {
            name,
            namespace,
            global,
            zookeeper,
            vault: vault.filter(|vault| vault.enabled),
        }
    }

    pub fn service_name(&self) -> &'a str {
        self.name
    }

    pub fn labels(&self) -> Labels {
        zookeeper_labels(self.name, &self.global.default_labels)
    }

    pub fn client_service(&self) -> Service {
        service(
            self.name,
            self.namespace,
            self.labels(),
            selector_labels(self.name),
            vec![
                service_port("zookeeper-client", CLIENT_PORT, TCP),
                service_port("nonencrypted-zookeeper-client", NONENCRYPTED_CLIENT_PORT, TCP),
            ],
        )
    }

    /// Headless service giving every peer a stable DNS name
    pub fn domain_service(&self) -> Service {
        let mut service_labels = self.labels();
        service_labels.insert(
            "app.kubernetes.io/instance".to_string(),
            format!("zookeper-{}", self.namespace),
        );
        let mut domain = service(
            &domain_name(self.name),
            self.namespace,
            service_labels,
            selector_labels(self.name),
            vec![
                service_port("zookeeper-client", CLIENT_PORT, TCP),
                service_port("nonencrypted-zookeeper-client", NONENCRYPTED_CLIENT_PORT, TCP),
                service_port("zookeeper-followers", FOLLOWERS_PORT, TCP),
                service_port("zookeeper-election", ELECTION_PORT, TCP),
                service_port("zookeeper-backup", BACKUP_PORT, TCP),
            ],
        );
        if let Some(spec) = domain.spec.as_mut() {
            spec.cluster_ip = Some("None".to_string());
            spec.publish_not_ready_addresses = Some(true);
        }
        domain
    }

    pub fn peer_service(&self, ordinal: u32) -> Service {
        let peer = peer_name(self.name, ordinal);
        let mut service_labels = self.labels();
        service_labels.insert("name".to_string(), peer.clone());
        let mut selector = selector_labels(self.name);
        selector.insert("name".to_string(), peer.clone());
        service(
            &peer,
            self.namespace,
            service_labels,
            selector,
            vec![
                service_port("zookeeper-client", CLIENT_PORT, TCP),
                service_port("nonencrypted-zookeeper-client", NONENCRYPTED_CLIENT_PORT, TCP),
                service_port("zookeeper-followers", FOLLOWERS_PORT, TCP),
                service_port("zookeeper-election", ELECTION_PORT, TCP),
                service_port("zookeeper-backup", BACKUP_PORT, TCP),
                service_port("zookeeper-jolokia", self.zookeeper.jolokia_port, TCP),
                service_port("prometheus-http", PROMETHEUS_PORT, TCP),
            ],
        )
    }

    pub fn service_account(&self) -> ServiceAccount {
        service_account(self.name, self.namespace)
    }

    fn declares_peer_storage(&self) -> bool {
        let storage = &self.zookeeper.storage;
        !storage.volumes.is_empty() || !storage.labels.is_empty() || !storage.class_name.is_empty()
    }

    /// Storage class of a peer: one class for all, or one per peer when the counts match
    fn peer_storage_class(&self, ordinal: u32) -> Option<&'a str> {
        let classes: &'a [String] = &self.zookeeper.storage.class_name;
        let per_peer = usize::try_from(self.zookeeper.replicas).ok() == Some(classes.len());
        let class = if per_peer {
            index(ordinal).and_then(|i| classes.get(i))
        } else {
            classes.first()
        };
        class.map(String::as_str)
    }

    /// Data claim of a peer, `None` when no peer storage is declared
    pub fn peer_claim(&self, ordinal: u32) -> Result<Option<PersistentVolumeClaim>, ReconcilerError> {
        let storage: &'a StorageConfig = &self.zookeeper.storage;
        let slot = index(ordinal);
        let per_peer = |values: &'a [String]| slot.and_then(|i| values.get(i)).map(String::as_str);
        non_shared_claim(
            &peer_claim_name(self.name, ordinal),
            self.namespace,
            self.labels(),
            per_peer(&storage.volumes),
            per_peer(&storage.labels),
            self.peer_storage_class(ordinal),
            &storage.size,
        )
    }

    fn snapshot_volume(&self) -> Volume {
        let snapshots = &self.zookeeper.snapshot_storage;
        match snapshots.persistent_volume_type {
            None | Some(PersistentVolumeType::Standalone) => empty_dir_volume("backup-storage"),
            Some(_) => claim_volume("backup-storage", &snapshots.claim_name(self.name)),
        }
    }

    fn health_probe(&self, check: &str, initial_delay: i32) -> Probe {
        let mut command = vec![HEALTH_SCRIPT.to_string(), check.to_string()];
        if self.vault.is_some() {
            command.insert(0, vault::VAULT_ENV_BINARY.to_string());
        }
        Probe {
            exec: Some(ExecAction {
                command: Some(command),
            }),
            initial_delay_seconds: Some(initial_delay),
            timeout_seconds: Some(20),
            period_seconds: Some(20),
            success_threshold: Some(1),
            failure_threshold: Some(5),
            ..Default::default()
        }
    }

    fn secret_envs(&self) -> Vec<EnvVar> {
        let keys = [
            ("ADMIN_USERNAME", "admin-credentials", "username", "admin-username"),
            ("ADMIN_PASSWORD", "admin-credentials", "password", "admin-password"),
            ("CLIENT_USERNAME", "client-credentials", "username", "client-username"),
            ("CLIENT_PASSWORD", "client-credentials", "password", "client-password"),
            ("ADDITIONAL_USERS", "additional-users", "users", "additional-users"),
        ];
        keys.into_iter()
            .map(|(name, vault_secret, vault_key, local_key)| match self.vault {
                Some(vault) => env(
                    name,
                    vault::secret_reference(vault, self.name, self.namespace, vault_secret, vault_key),
                ),
                None => secret_env(name, &self.zookeeper.secret_name, local_key),
            })
            .collect()
    }

    /// Workload of one peer
    pub fn peer_deployment(&self, ordinal: u32) -> Deployment {
        let zk = self.zookeeper;
        let peer = peer_name(self.name, ordinal);
        let domain = domain_name(self.name);

        let mut deployment_labels = self.labels();
        deployment_labels.insert("name".to_string(), peer.clone());
        deployment_labels.insert(
            "app.kubernetes.io/technology".to_string(),
            "java-others".to_string(),
        );
        deployment_labels.insert(
            "app.kubernetes.io/instance".to_string(),
            format!("{}-{}", self.name, self.namespace),
        );
        let mut selector = selector_labels(self.name);
        selector.insert("name".to_string(), peer.clone());
        let pod_labels = join_labels(&[
            &self.global.custom_labels,
            &zk.pod.custom_labels,
            &deployment_labels,
        ]);

        let data_volume = if self.declares_peer_storage() {
            claim_volume("data", &peer_claim_name(self.name, ordinal))
        } else {
            empty_dir_volume("data")
        };
        let mut volumes = vec![data_volume, empty_dir_volume("log"), self.snapshot_volume()];
        let mut mounts = vec![
            volume_mount("data", "/var/opt/zookeeper/data"),
            volume_mount("log", "/opt/zookeeper/log"),
            volume_mount("backup-storage", "/opt/zookeeper/backup-storage"),
        ];

        let mut envs = vec![
            env("SERVER_NAME", self.name),
            env("SERVER_ID", ordinal.to_string()),
            env("SERVER_DOMAIN", domain.as_str()),
            field_env("SERVER_NAMESPACE", "metadata.namespace"),
            env("SERVER_COUNT", zk.replicas.to_string()),
            env(
                "HEAP_OPTS",
                format!("-Xms{}m -Xmx{}m", zk.heap_size, zk.heap_size),
            ),
            env("QUORUM_AUTH_ENABLED", zk.quorum_auth_enabled.to_string()),
            env("JOLOKIA_PORT", zk.jolokia_port.to_string()),
            env("AUDIT_ENABLED", zk.audit_enabled.to_string()),
        ];
        envs.extend(self.secret_envs());

        if let Some(mode) = zk
            .diagnostics
            .mode
            .as_deref()
            .filter(|mode| DIAGNOSTIC_MODES.contains(mode))
        {
            envs.extend([
                field_env("CLOUD_NAMESPACE", "metadata.namespace"),
                env("MICROSERVICE_NAME", self.name),
                env("NC_DIAGNOSTIC_MODE", mode),
                env(
                    "NC_DIAGNOSTIC_AGENT_SERVICE",
                    zk.diagnostics.agent_service.clone().unwrap_or_default(),
                ),
            ]);
        }

        if let Some(vault) = self.vault {
            envs.extend(vault::connection_env(vault, self.name, self.namespace));
            volumes.push(vault::env_volume());
            mounts.push(vault::env_mount());
        }

        if let Some(secret) = self.global.zoo_keeper_ssl.active_secret() {
            envs.extend([
                env("ENABLE_SSL", "true"),
                env("SSL_CIPHER_SUITES", zk.ssl.cipher_suites.join(",")),
                env("ENABLE_2WAY_SSL", zk.ssl.enable_two_way_ssl.to_string()),
                env(
                    "ALLOW_NONENCRYPTED_ACCESS",
                    zk.ssl.allow_nonencrypted_access.to_string(),
                ),
            ]);
            volumes.push(secret_volume("ssl-certs", secret));
            mounts.push(volume_mount("ssl-certs", "/opt/zookeeper/tls"));
        }

        let container = Container {
            name: "zookeeper".to_string(),
            command: self
                .vault
                .map(|_| vec![vault::VAULT_ENV_BINARY.to_string()]),
            args: self.vault.map(|_| {
                ["/sbin/tini", "--", "/docker-entrypoint.sh", "start"]
                    .map(String::from)
                    .to_vec()
            }),
            image: Some(zk.pod.docker_image.clone()),
            ports: Some(vec![
                container_port(CLIENT_PORT, TCP),
                container_port(NONENCRYPTED_CLIENT_PORT, TCP),
                container_port(FOLLOWERS_PORT, TCP),
                container_port(ELECTION_PORT, TCP),
                container_port(zk.jolokia_port, TCP),
                container_port(PROMETHEUS_PORT, TCP),
            ]),
            liveness_probe: Some(self.health_probe("liveness-probe", 20)),
            readiness_probe: Some(self.health_probe("readiness-probe", 40)),
            env: Some(build_envs(envs, &zk.environment_variables)),
            resources: zk.pod.resources.clone(),
            volume_mounts: Some(mounts),
            image_pull_policy: Some("Always".to_string()),
            security_context: Some(default_container_security_context()),
            ..Default::default()
        };

        let node = index(ordinal)
            .and_then(|i| zk.storage.nodes.get(i))
            .map(String::as_str);
        let pod = PodSpec {
            volumes: Some(volumes),
            init_containers: self.vault.map(|vault| vec![vault::init_container(vault)]),
            containers: vec![container],
            security_context: zk.pod.security_context.clone(),
            hostname: Some(peer.clone()),
            service_account_name: Some(self.name.to_string()),
            subdomain: Some(domain),
            affinity: pinned_affinity(zk.pod.affinity.as_ref(), node),
            tolerations: Some(zk.pod.tolerations.clone()).filter(|t| !t.is_empty()),
            priority_class_name: zk.pod.priority_class_name.clone(),
            ..Default::default()
        };

        deployment(
            &peer,
            self.namespace,
            deployment_labels,
            selector,
            pod_labels,
            pod,
        )
    }
}

/// Zero-based slot of a 1-based ordinal
fn index(ordinal: u32) -> Option<usize> {
    ordinal
        .checked_sub(1)
        .and_then(|i| usize::try_from(i).ok())
}
