//! # Vault API paths
//!
//! Paths for the subset of the Vault HTTP API the operator consumes:
//! KV version 2 secrets, ACL policies, auth method login and roles,
//! and password policies.

use std::fmt;

/// Axum route for KV v2 secret data (`GET` reads, `POST` writes a new version)
pub const KV_DATA_ROUTE: &str = "/v1/{mount}/data/{*name}";
/// Axum route for ACL policies
pub const SYS_POLICY_ROUTE: &str = "/v1/sys/policy/{name}";
/// Axum route for auth method login
pub const AUTH_LOGIN_ROUTE: &str = "/v1/auth/{method}/login";
/// Axum route for auth method roles
pub const AUTH_ROLE_ROUTE: &str = "/v1/auth/{method}/role/{role}";
/// Axum route for password policies
pub const PASSWORD_POLICY_ROUTE: &str = "/v1/sys/policies/password/{name}";
/// Axum route for password generation from a password policy
pub const PASSWORD_GENERATE_ROUTE: &str = "/v1/sys/policies/password/{name}/generate";

/// A concrete Vault API request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultPath<'a> {
    /// KV v2 secret data at `{mount}/data/{name}`
    KvData { mount: &'a str, name: &'a str },
    /// ACL policy
    SysPolicy { name: &'a str },
    /// Login endpoint of an auth method
    AuthLogin { method: &'a str },
    /// Role of an auth method
    AuthRole { method: &'a str, role: &'a str },
    /// Password policy definition
    PasswordPolicy { name: &'a str },
    /// Password generation for a password policy
    PasswordGenerate { name: &'a str },
}

impl VaultPath<'_> {
    /// Build the HTTP path, always rooted at `/v1/`
    #[must_use]
    pub fn to_path(&self) -> String {
        match self {
            VaultPath::KvData { mount, name } => {
                format!("/v1/{}/data/{}", trim_slashes(mount), trim_slashes(name))
            }
            VaultPath::SysPolicy { name } => format!("/v1/sys/policy/{name}"),
            VaultPath::AuthLogin { method } => format!("/v1/auth/{}/login", trim_slashes(method)),
            VaultPath::AuthRole { method, role } => {
                format!("/v1/auth/{}/role/{role}", trim_slashes(method))
            }
            VaultPath::PasswordPolicy { name } => format!("/v1/sys/policies/password/{name}"),
            VaultPath::PasswordGenerate { name } => {
                format!("/v1/sys/policies/password/{name}/generate")
            }
        }
    }
}

impl fmt::Display for VaultPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_path())
    }
}

fn trim_slashes(value: &str) -> &str {
    value.trim_matches('/')
}
