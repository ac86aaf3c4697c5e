//! # Common Builders
//!
//! Small constructors shared by the component templates.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    Affinity, Capabilities, ContainerPort, EmptyDirVolumeSource, EnvVar, EnvVarSource, NodeAffinity,
    NodeSelector, NodeSelectorRequirement, NodeSelectorTerm, ObjectFieldSelector,
    PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, SecretKeySelector,
    SecretVolumeSource, SecurityContext, Service, ServiceAccount, ServicePort, ServiceSpec, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use tracing::warn;

pub type Labels = BTreeMap<String, String>;

pub const TCP: &str = "TCP";
pub const UDP: &str = "UDP";

/// Node label used to pin workloads to a host
const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

/// Merge label layers; later layers win on key conflicts
pub fn join_labels(layers: &[&Labels]) -> Labels {
    layers
        .iter()
        .flat_map(|layer| layer.iter())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

pub fn labels<const N: usize>(pairs: [(&str, &str); N]) -> Labels {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn metadata(name: &str, namespace: &str, labels: Option<Labels>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels,
        ..Default::default()
    }
}

pub fn service_port(name: &str, port: i32, protocol: &str) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        protocol: Some(protocol.to_string()),
        ..Default::default()
    }
}

pub fn container_port(port: i32, protocol: &str) -> ContainerPort {
    ContainerPort {
        container_port: port,
        protocol: Some(protocol.to_string()),
        ..Default::default()
    }
}

/// ClusterIP service selecting pods by `selector`
pub fn service(
    name: &str,
    namespace: &str,
    labels: Labels,
    selector: Labels,
    ports: Vec<ServicePort>,
) -> Service {
    Service {
        metadata: metadata(name, namespace, Some(labels)),
        spec: Some(ServiceSpec {
            ports: Some(ports),
            selector: Some(selector),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Single-replica deployment with the `Recreate` strategy
pub fn deployment(
    name: &str,
    namespace: &str,
    labels: Labels,
    selector: Labels,
    pod_labels: Labels,
    pod: PodSpec,
) -> Deployment {
    Deployment {
        metadata: metadata(name, namespace, Some(labels)),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            strategy: Some(DeploymentStrategy {
                type_: Some("Recreate".to_string()),
                ..Default::default()
            }),
            selector: LabelSelector {
                match_labels: Some(selector),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..Default::default()
                }),
                spec: Some(pod),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn service_account(name: &str, namespace: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: metadata(name, namespace, None),
        ..Default::default()
    }
}

pub fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

pub fn secret_env(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn field_env(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: field_path.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Append `NAME=value` entries; malformed entries are logged and skipped
pub fn build_envs(mut envs: Vec<EnvVar>, additional: &[String]) -> Vec<EnvVar> {
    for entry in additional {
        match entry.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                envs.push(env(name.trim(), value.trim()));
            }
            _ => warn!("Environment variable \"{}\" is incorrect", entry),
        }
    }
    envs
}

/// No privilege escalation, every capability dropped
pub fn default_container_security_context() -> SecurityContext {
    SecurityContext {
        allow_privilege_escalation: Some(false),
        capabilities: Some(Capabilities {
            drop: Some(vec!["ALL".to_string()]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn empty_dir_volume(name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}

pub fn secret_volume(name: &str, secret: &str) -> Volume {
    Volume {
        name: name.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn claim_volume(name: &str, claim: &str) -> Volume {
    Volume {
        name: name.to_string(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: claim.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn volume_mount(name: &str, mount_path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: mount_path.to_string(),
        ..Default::default()
    }
}

/// Declared affinity, with node affinity replaced by a hostname pin when `node` is set
pub fn pinned_affinity(declared: Option<&Affinity>, node: Option<&str>) -> Option<Affinity> {
    let Some(node) = node.filter(|node| !node.is_empty()) else {
        return declared.cloned();
    };
    let mut affinity = declared.cloned().unwrap_or_default();
    affinity.node_affinity = Some(NodeAffinity {
        required_during_scheduling_ignored_during_execution: Some(NodeSelector {
            node_selector_terms: vec![NodeSelectorTerm {
                match_expressions: Some(vec![NodeSelectorRequirement {
                    key: HOSTNAME_LABEL.to_string(),
                    operator: "In".to_string(),
                    values: Some(vec![node.to_string()]),
                }]),
                ..Default::default()
            }],
        }),
        ..Default::default()
    });
    Some(affinity)
}
