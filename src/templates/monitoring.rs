//! # Monitoring Templates
//!
//! Service and workload of the telemetry agent that scrapes the ensemble.

use super::common::{
    container_port, default_container_security_context, deployment, env, field_env, join_labels,
    labels, secret_env, secret_volume, service, service_account, service_port, volume_mount,
    Labels, TCP, UDP,
};
use super::vault;
use crate::crd::{BackupDaemonConfig, GlobalConfig, MonitoringConfig, VaultConfig};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EnvVar, KeyToPath, PodSpec, Service,
    ServiceAccount, Volume,
};

const PROMETHEUS_TYPE: &str = "prometheus";

pub fn monitoring_name(name: &str) -> String {
    format!("{name}-monitoring")
}

/// Resource builders for the monitoring agent
#[derive(Debug, Clone)]
pub struct MonitoringTemplates<'a> {
    zookeeper_name: &'a str,
    service_name: String,
    namespace: &'a str,
    global: &'a GlobalConfig,
    monitoring: &'a MonitoringConfig,
    backup_daemon: Option<&'a BackupDaemonConfig>,
    vault: Option<&'a VaultConfig>,
}

impl<'a> MonitoringTemplates<'a> {
    pub fn new(
        zookeeper_name: &'a str,
        namespace: &'a str,
        global: &'a GlobalConfig,
        monitoring: &'a MonitoringConfig,
        backup_daemon: Option<&'a BackupDaemonConfig>,
        vault: Option<&'a VaultConfig>,
    ) -> Self {
        Self {
            zookeeper_name,
            service_name: monitoring_name(zookeeper_name),
            namespace,
            global,
            monitoring,
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
            ("component", "zookeeper-monitoring"),
        ])
    }

    pub fn labels(&self) -> Labels {
        join_labels(&[
            &labels([("app.kubernetes.io/name", self.service_name.as_str())]),
            &self.selector_labels(),
            &self.global.default_labels,
        ])
    }

    fn prometheus(&self) -> bool {
        self.monitoring.monitoring_type == PROMETHEUS_TYPE
    }

    pub fn service(&self) -> Service {
        let mut ports = vec![
            service_port("zookeeper-monitoring-statsd", 8125, TCP),
            service_port("zookeeper-monitoring-tcp", 8094, TCP),
            service_port("zookeeper-monitoring-udp", 8092, UDP),
        ];
        if self.prometheus() {
            ports.push(service_port("prometheus-cli", 8096, TCP));
        }
        service(
            &self.service_name,
            self.namespace,
            self.labels(),
            self.selector_labels(),
            ports,
        )
    }

    pub fn service_account(&self) -> ServiceAccount {
        service_account(&self.service_name, self.namespace)
    }

    fn config_volume(&self) -> Volume {
        Volume {
            name: "config".to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: format!("{}-configuration", self.service_name),
                items: Some(vec![KeyToPath {
                    key: "config".to_string(),
                    path: "telegraf.conf".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn envs(&self) -> Vec<EnvVar> {
        let mut envs = vec![
            field_env("OS_PROJECT", "metadata.namespace"),
            env("ZOOKEEPER_HOST", self.monitoring.zoo_keeper_host.as_str()),
            env(
                "ZOOKEEPER_ENABLE_SSL",
                self.global.zoo_keeper_ssl.enabled.to_string(),
            ),
        ];
        if let Some(backup_daemon) = self.backup_daemon {
            envs.extend([
                env(
                    "ZOOKEEPER_BACKUP_DAEMON_HOST",
                    self.monitoring
                        .zoo_keeper_backup_daemon_host
                        .clone()
                        .unwrap_or_default(),
                ),
                env("S3_ENABLED", backup_daemon.s3_enabled().to_string()),
                secret_env(
                    "ZOOKEEPER_BACKUP_DAEMON_USERNAME",
                    &backup_daemon.secret_name,
                    "username",
                ),
                secret_env(
                    "ZOOKEEPER_BACKUP_DAEMON_PASSWORD",
                    &backup_daemon.secret_name,
                    "password",
                ),
            ]);
        }
        // Client credentials belong to the ensemble, not to this component
        match self.vault {
            Some(vault) => envs.extend([
                env(
                    "ZOOKEEPER_CLIENT_USERNAME",
                    vault::secret_reference(
                        vault,
                        self.zookeeper_name,
                        self.namespace,
                        "client-credentials",
                        "username",
                    ),
                ),
                env(
                    "ZOOKEEPER_CLIENT_PASSWORD",
                    vault::secret_reference(
                        vault,
                        self.zookeeper_name,
                        self.namespace,
                        "client-credentials",
                        "password",
                    ),
                ),
            ]),
            None => envs.extend([
                secret_env(
                    "ZOOKEEPER_CLIENT_USERNAME",
                    &self.monitoring.secret_name,
                    "zookeeper-client-username",
                ),
                secret_env(
                    "ZOOKEEPER_CLIENT_PASSWORD",
                    &self.monitoring.secret_name,
                    "zookeeper-client-password",
                ),
            ]),
        }
        envs
    }

    pub fn deployment(&self) -> Deployment {
        let mut deployment_labels = self.labels();
        deployment_labels.insert(
            "app.kubernetes.io/technology".to_string(),
            "python".to_string(),
        );
        deployment_labels.insert(
            "app.kubernetes.io/instance".to_string(),
            format!("{}-{}", self.service_name, self.namespace),
        );
        let pod_labels = join_labels(&[
            &self.global.custom_labels,
            &self.monitoring.pod.custom_labels,
            &deployment_labels,
        ]);

        let mut ports: Vec<ContainerPort> = vec![
            container_port(8125, TCP),
            container_port(8094, TCP),
            container_port(8092, UDP),
        ];
        if self.prometheus() {
            // Port names are limited to 15 characters
            ports.push(ContainerPort {
                name: Some("prometheus-cli".to_string()),
                ..container_port(8096, TCP)
            });
        }

        let mut envs = self.envs();
        let mut volumes = vec![self.config_volume()];
        let mut mounts = vec![volume_mount("config", "/etc/telegraf")];

        if let Some(vault) = self.vault {
            envs.extend(vault::connection_env(vault, &self.service_name, self.namespace));
            volumes.push(vault::env_volume());
            mounts.push(vault::env_mount());
        }
        if let Some(secret) = self.global.zoo_keeper_ssl.active_secret() {
            volumes.push(secret_volume("ssl-certs", secret));
            mounts.push(volume_mount("ssl-certs", "/tls"));
        }
        if let Some(backup_ssl) = self
            .backup_daemon
            .map(|bd| &bd.backup_daemon_ssl)
            .filter(|ssl| ssl.enabled)
        {
            envs.push(env("BACKUP_DAEMON_TLS_ENABLED", "true"));
            volumes.push(secret_volume(
                "backup-daemon-tls-certs",
                backup_ssl.secret_name.as_deref().unwrap_or_default(),
            ));
            mounts.push(volume_mount("backup-daemon-tls-certs", "/tls/backup"));
        }

        let pod_settings = &self.monitoring.pod;
        let container = Container {
            name: self.service_name.clone(),
            image: Some(pod_settings.docker_image.clone()),
            ports: Some(ports),
            env: Some(envs),
            resources: pod_settings.resources.clone(),
            volume_mounts: Some(mounts),
            image_pull_policy: Some("Always".to_string()),
            command: self
                .vault
                .map(|_| vec![vault::VAULT_ENV_BINARY.to_string()]),
            args: self.vault.map(|_| vec!["/docker-entrypoint.sh".to_string()]),
            security_context: Some(default_container_security_context()),
            ..Default::default()
        };
        let pod = PodSpec {
            volumes: Some(volumes),
            affinity: pod_settings.affinity.clone(),
            tolerations: Some(pod_settings.tolerations.clone()).filter(|t| !t.is_empty()),
            priority_class_name: pod_settings.priority_class_name.clone(),
            init_containers: self.vault.map(|vault| vec![vault::init_container(vault)]),
            containers: vec![container],
            security_context: pod_settings.security_context.clone(),
            service_account_name: Some(self.service_name.clone()),
            hostname: Some(self.service_name.clone()),
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
