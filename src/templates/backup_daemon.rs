//! # Backup Daemon Templates

use super::common::{
    claim_volume, container_port, default_container_security_context, deployment, empty_dir_volume,
    env, field_env, join_labels, labels, pinned_affinity, secret_env, secret_volume, service,
    service_account, service_port, volume_mount, Labels, TCP,
};
use super::vault;
use crate::crd::{BackupDaemonConfig, GlobalConfig, VaultConfig};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    Container, EnvVar, PodSpec, Probe, Service, ServiceAccount, TCPSocketAction,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

const HTTP_PORT: i32 = 8080;
const HTTPS_PORT: i32 = 8443;

pub fn backup_daemon_name(name: &str) -> String {
    format!("{name}-backup-daemon")
}

/// Resource builders for the backup daemon
#[derive(Debug, Clone)]
pub struct BackupDaemonTemplates<'a> {
    zookeeper_name: &'a str,
    service_name: String,
    namespace: &'a str,
    global: &'a GlobalConfig,
    backup_daemon: &'a BackupDaemonConfig,
    vault: Option<&'a VaultConfig>,
}

impl<'a> BackupDaemonTemplates<'a> {
    pub fn new(
        zookeeper_name: &'a str,
        namespace: &'a str,
        global: &'a GlobalConfig,
        backup_daemon: &'a BackupDaemonConfig,
        vault: Option<&'a VaultConfig>,
    ) -> Self {
        Self {
            zookeeper_name,
            service_name: backup_daemon_name(zookeeper_name),
            namespace,
            global,
            backup_daemon,
            vault: vault.filter(|vault| vault.enabled),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn selector_labels(&self) -> Labels {
        labels([
            ("name", self.service_name.as_str()),
            ("component", "zookeeper-backup-daemon"),
        ])
    }

    pub fn labels(&self) -> Labels {
        join_labels(&[
            &labels([("app.kubernetes.io/name", self.service_name.as_str())]),
            &self.selector_labels(),
            &self.global.default_labels,
        ])
    }

    fn port(&self) -> i32 {
        if self.backup_daemon.backup_daemon_ssl.enabled {
            HTTPS_PORT
        } else {
            HTTP_PORT
        }
    }

    pub fn service(&self) -> Service {
        service(
            &self.service_name,
            self.namespace,
            self.labels(),
            self.selector_labels(),
            vec![service_port("http", self.port(), TCP)],
        )
    }

    pub fn service_account(&self) -> ServiceAccount {
        service_account(&self.service_name, self.namespace)
    }

    fn probe(&self) -> Probe {
        Probe {
            tcp_socket: Some(TCPSocketAction {
                port: IntOrString::Int(self.port()),
                ..Default::default()
            }),
            initial_delay_seconds: Some(30),
            timeout_seconds: Some(5),
            period_seconds: Some(10),
            success_threshold: Some(1),
            failure_threshold: Some(5),
            ..Default::default()
        }
    }

    fn credential_envs(&self) -> Vec<EnvVar> {
        let bd = self.backup_daemon;
        let mut envs = match self.vault {
            Some(vault) => {
                let own = |name: &str, key: &str| {
                    env(
                        name,
                        vault::secret_reference(
                            vault,
                            &self.service_name,
                            self.namespace,
                            "credentials",
                            key,
                        ),
                    )
                };
                let admin = |name: &str, key: &str| {
                    env(
                        name,
                        vault::secret_reference(
                            vault,
                            self.zookeeper_name,
                            self.namespace,
                            "admin-credentials",
                            key,
                        ),
                    )
                };
                vec![
                    own("BACKUP_DAEMON_API_CREDENTIALS_USERNAME", "username"),
                    own("BACKUP_DAEMON_API_CREDENTIALS_PASSWORD", "password"),
                    admin("ZOOKEEPER_ADMIN_USERNAME", "username"),
                    admin("ZOOKEEPER_ADMIN_PASSWORD", "password"),
                ]
            }
            None => vec![
                secret_env("BACKUP_DAEMON_API_CREDENTIALS_USERNAME", &bd.secret_name, "username"),
                secret_env("BACKUP_DAEMON_API_CREDENTIALS_PASSWORD", &bd.secret_name, "password"),
                secret_env(
                    "ZOOKEEPER_ADMIN_USERNAME",
                    &bd.secret_name,
                    "zookeeper-admin-username",
                ),
                secret_env(
                    "ZOOKEEPER_ADMIN_PASSWORD",
                    &bd.secret_name,
                    "zookeeper-admin-password",
                ),
            ],
        };
        if let Some(s3) = bd.s3.as_ref().filter(|s3| s3.enabled) {
            let secret = s3.secret_name.as_deref().unwrap_or_default();
            envs.extend([
                secret_env("S3_KEY_ID", secret, "s3-key-id"),
                secret_env("S3_KEY_SECRET", secret, "s3-key-secret"),
            ]);
        }
        envs
    }

    pub fn deployment(&self) -> Deployment {
        let bd = self.backup_daemon;
        let mut deployment_labels = self.labels();
        deployment_labels.insert(
            "app.kubernetes.io/instance".to_string(),
            format!("{}-{}", self.service_name, self.namespace),
        );
        deployment_labels.insert(
            "app.kubernetes.io/technology".to_string(),
            "python".to_string(),
        );
        let pod_labels = join_labels(&[
            &self.global.custom_labels,
            &bd.pod.custom_labels,
            &deployment_labels,
        ]);

        let storage = &bd.backup_storage;
        let backup_volume = match storage.persistent_volume_type {
            None => empty_dir_volume("backup-storage"),
            Some(_) => claim_volume("backup-storage", &storage.claim_name(self.zookeeper_name)),
        };
        let mut volumes = vec![backup_volume];
        let mut mounts = vec![volume_mount("backup-storage", "/opt/zookeeper/backup-storage")];

        let mut envs = vec![
            env("SERVICE_NAME", self.service_name.as_str()),
            env("ZOOKEEPER_HOST", bd.zoo_keeper_host.as_str()),
            env("ZOOKEEPER_PORT", bd.zoo_keeper_port.to_string()),
            env(
                "PV_TYPE",
                storage
                    .persistent_volume_type
                    .map(|kind| kind.as_str())
                    .unwrap_or_default(),
            ),
            field_env("NAMESPACE", "metadata.namespace"),
            env(
                "ZOOKEEPER_ENABLE_SSL",
                self.global.zoo_keeper_ssl.enabled.to_string(),
            ),
        ];
        if let Some(schedule) = bd.backup_schedule.as_deref().filter(|s| !s.is_empty()) {
            envs.push(env("BACKUP_SCHEDULE", schedule));
        }
        if let Some(policy) = bd.eviction_policy.as_deref().filter(|p| !p.is_empty()) {
            envs.push(env("EVICTION_POLICY", policy));
        }
        if bd.ipv6 {
            envs.push(env("BROADCAST_ADDRESS", "::"));
        }
        let s3 = bd.s3.as_ref().filter(|s3| s3.enabled);
        if let Some(s3) = s3 {
            envs.extend([
                env("S3_ENABLED", "true"),
                env("S3_URL", s3.url.as_str()),
                env("S3_BUCKET", s3.bucket.as_str()),
            ]);
        }
        envs.extend(self.credential_envs());

        if let Some(vault) = self.vault {
            envs.extend(vault::connection_env(vault, &self.service_name, self.namespace));
            volumes.push(vault::env_volume());
            mounts.push(vault::env_mount());
        }
        if let Some(secret) = self.global.zoo_keeper_ssl.active_secret() {
            volumes.push(secret_volume("ssl-certs", secret));
            mounts.push(volume_mount("ssl-certs", "/tls"));
        }
        if let Some(secret) = bd.backup_daemon_ssl.active_secret() {
            envs.extend([env("TLS_ENABLED", "true"), env("CERTS_PATH", "/backupTLS")]);
            volumes.push(secret_volume("backup-ssl-certs", secret));
            mounts.push(volume_mount("backup-ssl-certs", "/backupTLS"));
        }
        let s3_certs = s3.filter(|s3| s3.ssl_verify && s3.ssl_cert.as_deref().is_some_and(|c| !c.is_empty()));
        if let Some(s3) = s3_certs {
            envs.push(env("S3_CERTS_PATH", "/s3Certs"));
            volumes.push(secret_volume(
                "s3-ssl-certs",
                s3.ssl_secret_name.as_deref().unwrap_or_default(),
            ));
            mounts.push(volume_mount("s3-ssl-certs", "/s3Certs"));
        }

        let container = Container {
            name: self.service_name.clone(),
            image: Some(bd.pod.docker_image.clone()),
            ports: Some(vec![container_port(self.port(), TCP)]),
            env: Some(envs),
            resources: bd.pod.resources.clone(),
            volume_mounts: Some(mounts),
            liveness_probe: Some(self.probe()),
            readiness_probe: Some(self.probe()),
            image_pull_policy: Some("Always".to_string()),
            command: self
                .vault
                .map(|_| vec![vault::VAULT_ENV_BINARY.to_string()]),
            args: self.vault.map(|_| {
                vec![
                    "python3".to_string(),
                    "/opt/backup/backup-daemon.py".to_string(),
                ]
            }),
            security_context: Some(default_container_security_context()),
            ..Default::default()
        };
        let pod = PodSpec {
            volumes: Some(volumes),
            init_containers: self.vault.map(|vault| vec![vault::init_container(vault)]),
            containers: vec![container],
            security_context: bd.pod.security_context.clone(),
            service_account_name: Some(self.service_name.clone()),
            hostname: Some(self.service_name.clone()),
            affinity: pinned_affinity(bd.pod.affinity.as_ref(), storage.node_name.as_deref()),
            tolerations: Some(bd.pod.tolerations.clone()).filter(|t| !t.is_empty()),
            priority_class_name: bd.pod.priority_class_name.clone(),
            ..Default::default()
        };

        deployment(
            &self.service_name,
            self.namespace,
            deployment_labels,
            self.selector_labels(),
            pod_labels,
            pod,
        )
    }
}
