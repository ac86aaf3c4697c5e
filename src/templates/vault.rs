//! # Vault Templates
//!
//! Names, ACL policies, auth roles and workload wiring for delegated
//! credentials.

use super::common::{default_container_security_context, empty_dir_volume, env, volume_mount};
use crate::crd::VaultConfig;
use k8s_openapi::api::core::v1::{Container, EnvVar, Volume, VolumeMount};
use serde_json::{json, Value};

pub const VAULT_ENV_VOLUME: &str = "vault-env";
pub const VAULT_ENV_MOUNT_PATH: &str = "/vault";
/// Entrypoint wrapper that resolves `vault:` references before exec
pub const VAULT_ENV_BINARY: &str = "/vault/vault-env";

const ROLE_TTL: &str = "30m";

/// Password policy: 10 characters, at least 3 lower, 3 upper, 1 digit and 1 of `_!`
pub const PASSWORD_POLICY: &str = r#"length = 10
rule "charset" {
  charset = "abcdefghijklmnopqrstuvwxyz"
  min-chars = 3
}
rule "charset" {
  charset = "ABCDEFGHIJKLMNOPQRSTUVWXYZ"
  min-chars = 3
}
rule "charset" {
  charset = "0123456789"
  min-chars = 1
}
rule "charset" {
  charset = "_!"
  min-chars = 1
}
"#;

/// `{service}.{namespace}`, the prefix of every per-component Vault object
pub fn scope(service: &str, namespace: &str) -> String {
    format!("{service}.{namespace}")
}

pub fn policy_name(service: &str, namespace: &str) -> String {
    format!("{}-policy", scope(service, namespace))
}

pub fn admin_policy_name(service: &str, namespace: &str) -> String {
    format!("{}-admin-policy", scope(service, namespace))
}

pub fn client_policy_name(service: &str, namespace: &str) -> String {
    format!("{}-client-policy", scope(service, namespace))
}

pub fn role_name(service: &str, namespace: &str) -> String {
    format!("{}-role", scope(service, namespace))
}

pub fn password_policy_name(service: &str, namespace: &str) -> String {
    format!("{}-password-policy", scope(service, namespace))
}

/// KV secret name `{service}.{namespace}/{secret}`
pub fn secret_name(service: &str, namespace: &str, secret: &str) -> String {
    format!("{}/{secret}", scope(service, namespace))
}

/// Reference resolved by `vault-env` inside the workload
pub fn secret_reference(
    vault: &VaultConfig,
    service: &str,
    namespace: &str,
    secret: &str,
    key: &str,
) -> String {
    format!(
        "vault:/{}/data/{}#{key}",
        vault.path,
        secret_name(service, namespace, secret)
    )
}

/// Read/list grants on `{path}/data/{service}.{namespace}/{pattern}` for each pattern
pub fn read_policy(vault: &VaultConfig, service: &str, namespace: &str, patterns: &[&str]) -> String {
    patterns
        .iter()
        .map(|pattern| {
            format!(
                "path \"{}/data/{}\" \n{{\n\tcapabilities = [\"read\", \"list\"]\n}}",
                vault.path,
                secret_name(service, namespace, pattern)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Auth role binding a service account to `policies`
pub fn auth_role(service_account: &str, namespace: &str, policies: &[String]) -> Value {
    json!({
        "bound_service_account_names": service_account,
        "bound_service_account_namespaces": namespace,
        "policies": policies,
        "ttl": ROLE_TTL,
    })
}

pub fn connection_env(vault: &VaultConfig, service: &str, namespace: &str) -> Vec<EnvVar> {
    vec![
        env("VAULT_SKIP_VERIFY", "True"),
        env("VAULT_ADDR", vault.url.as_str()),
        env("VAULT_PATH", vault.method.as_str()),
        env("VAULT_ROLE", role_name(service, namespace)),
        env("VAULT_IGNORE_MISSING_SECRETS", "False"),
    ]
}

/// Copies the `vault-env` binary into the shared volume
pub fn init_container(vault: &VaultConfig) -> Container {
    Container {
        name: "copy-vault-env".to_string(),
        image: Some(vault.docker_image.clone()),
        command: Some(vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("cp /usr/local/bin/vault-env {VAULT_ENV_MOUNT_PATH}/"),
        ]),
        volume_mounts: Some(vec![env_mount()]),
        image_pull_policy: Some("IfNotPresent".to_string()),
        security_context: Some(default_container_security_context()),
        ..Default::default()
    }
}

pub fn env_volume() -> Volume {
    empty_dir_volume(VAULT_ENV_VOLUME)
}

pub fn env_mount() -> VolumeMount {
    volume_mount(VAULT_ENV_VOLUME, VAULT_ENV_MOUNT_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> VaultConfig {
        VaultConfig {
            enabled: true,
            path: "secret".into(),
            url: "http://vault:8200".into(),
            method: "kubernetes".into(),
            ..Default::default()
        }
    }

    #[test]
    fn secret_reference_points_at_kv_data() {
        assert_eq!(
            secret_reference(&vault(), "zk", "ns", "admin-credentials", "password"),
            "vault:/secret/data/zk.ns/admin-credentials#password"
        );
    }

    #[test]
    fn read_policy_joins_one_block_per_pattern() {
        let policy = read_policy(&vault(), "zk", "ns", &["admin-credentials", "*"]);
        let blocks: Vec<&str> = policy.split("\n}").collect();
        assert_eq!(blocks.len(), 3);
        assert!(policy.starts_with("path \"secret/data/zk.ns/admin-credentials\" \n{"));
        assert!(policy.contains("path \"secret/data/zk.ns/*\""));
        assert!(policy.contains("capabilities = [\"read\", \"list\"]"));
    }

    #[test]
    fn auth_role_binds_account_and_policies() {
        let role = auth_role("zk", "ns", &["zk.ns-admin-policy".to_string()]);
        assert_eq!(role["bound_service_account_names"], "zk");
        assert_eq!(role["bound_service_account_namespaces"], "ns");
        assert_eq!(role["policies"][0], "zk.ns-admin-policy");
        assert_eq!(role["ttl"], "30m");
    }

    #[test]
    fn connection_env_uses_component_role() {
        let envs = connection_env(&vault(), "zk-monitoring", "ns");
        let role = envs.iter().find(|e| e.name == "VAULT_ROLE").unwrap();
        assert_eq!(role.value.as_deref(), Some("zk-monitoring.ns-role"));
    }
}
