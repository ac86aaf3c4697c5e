//! # Vault REST Client
//!
//! Minimal Vault HTTP API client over reqwest: KV v2 secrets, ACL policies,
//! auth roles and password policies.

use crate::crd::VaultConfig;
use crate::provider::{SecretFields, SecretStore, SecretStoreError};
use async_trait::async_trait;
use paths::VaultPath;
use reqwest::{Client as ReqwestClient, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, info};
use zeroize::Zeroizing;

const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";

/// Authenticated Vault session
pub struct VaultClient {
    http: ReqwestClient,
    base_url: String,
    method: String,
    token: Zeroizing<String>,
}

impl fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultClient")
            .field("base_url", &self.base_url)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

impl VaultClient {
    /// Log in with a service account JWT and keep the issued client token
    pub async fn login(
        http: ReqwestClient,
        config: &VaultConfig,
        jwt: &str,
    ) -> Result<Self, SecretStoreError> {
        let base_url = config.url.trim_end_matches('/').to_string();
        let path = VaultPath::AuthLogin {
            method: &config.method,
        }
        .to_path();
        let request = http
            .post(format!("{base_url}{path}"))
            .json(&json!({ "jwt": jwt, "role": config.role }));
        let response = execute(request, &path, false).await?;
        let token = response
            .pointer("/auth/client_token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| SecretStoreError::Malformed {
                path: path.clone(),
                reason: "login response carries no auth.client_token".to_string(),
            })?;

        info!("Operator authenticated in Vault using service account JWT");
        Ok(Self {
            http,
            base_url,
            method: config.method.clone(),
            token: Zeroizing::new(token.to_string()),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header(VAULT_TOKEN_HEADER, self.token.as_str())
    }
}

/// Send a request; `Ok(None)` for a 404 when `allow_missing` is set
async fn execute_optional(
    request: RequestBuilder,
    path: &str,
    allow_missing: bool,
) -> Result<Option<Value>, SecretStoreError> {
    let response = request
        .send()
        .await
        .map_err(|source| SecretStoreError::Http {
            path: path.to_string(),
            source,
        })?;
    let status = response.status();
    if allow_missing && status == StatusCode::NOT_FOUND {
        debug!("Vault object at {} is not found", path);
        return Ok(None);
    }
    let body = response
        .text()
        .await
        .map_err(|source| SecretStoreError::Http {
            path: path.to_string(),
            source,
        })?;
    if !status.is_success() {
        return Err(SecretStoreError::Status {
            path: path.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    if body.trim().is_empty() {
        return Ok(Some(Value::Null));
    }
    serde_json::from_str(&body)
        .map(Some)
        .map_err(|e| SecretStoreError::Malformed {
            path: path.to_string(),
            reason: e.to_string(),
        })
}

async fn execute(
    request: RequestBuilder,
    path: &str,
    allow_missing: bool,
) -> Result<Value, SecretStoreError> {
    Ok(execute_optional(request, path, allow_missing)
        .await?
        .unwrap_or(Value::Null))
}

/// String-valued fields of a KV payload; other value types are skipped
fn string_fields(data: &Value) -> SecretFields {
    data.as_object()
        .map(|object| {
            object
                .iter()
                .filter_map(|(key, value)| value.as_str().map(|v| (key.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl SecretStore for VaultClient {
    async fn read_secret(
        &self,
        path: &str,
        name: &str,
    ) -> Result<Option<SecretFields>, SecretStoreError> {
        let api_path = VaultPath::KvData { mount: path, name }.to_path();
        let response =
            execute_optional(self.request(reqwest::Method::GET, &api_path), &api_path, true)
                .await?;
        Ok(response.map(|body| {
            body.pointer("/data/data")
                .map(string_fields)
                .unwrap_or_default()
        }))
    }

    async fn write_secret(
        &self,
        path: &str,
        name: &str,
        fields: &SecretFields,
    ) -> Result<u64, SecretStoreError> {
        let api_path = VaultPath::KvData { mount: path, name }.to_path();
        let request = self
            .request(reqwest::Method::POST, &api_path)
            .json(&json!({ "data": fields }));
        let response = execute(request, &api_path, false).await?;
        let version = response
            .pointer("/data/version")
            .and_then(Value::as_u64)
            .ok_or_else(|| SecretStoreError::Malformed {
                path: api_path.clone(),
                reason: "write response carries no data.version".to_string(),
            })?;
        info!("Secret '{}' was updated, new version is {}", api_path, version);
        Ok(version)
    }

    async fn read_policy(&self, name: &str) -> Result<Option<String>, SecretStoreError> {
        let api_path = VaultPath::SysPolicy { name }.to_path();
        let response =
            execute_optional(self.request(reqwest::Method::GET, &api_path), &api_path, true)
                .await?;
        Ok(response.and_then(|body| {
            body.get("rules")
                .or_else(|| body.pointer("/data/rules"))
                .and_then(Value::as_str)
                .filter(|rules| !rules.is_empty())
                .map(str::to_string)
        }))
    }

    async fn write_policy(&self, name: &str, policy: &str) -> Result<(), SecretStoreError> {
        let api_path = VaultPath::SysPolicy { name }.to_path();
        let request = self
            .request(reqwest::Method::PUT, &api_path)
            .json(&json!({ "policy": policy }));
        execute(request, &api_path, false).await?;
        info!("Policy '{}' was updated", name);
        Ok(())
    }

    async fn read_auth_role(&self, name: &str) -> Result<Option<Value>, SecretStoreError> {
        let api_path = VaultPath::AuthRole {
            method: &self.method,
            role: name,
        }
        .to_path();
        execute_optional(self.request(reqwest::Method::GET, &api_path), &api_path, true).await
    }

    async fn write_auth_role(&self, name: &str, role: &Value) -> Result<(), SecretStoreError> {
        let api_path = VaultPath::AuthRole {
            method: &self.method,
            role: name,
        }
        .to_path();
        let request = self.request(reqwest::Method::POST, &api_path).json(role);
        execute(request, &api_path, false).await?;
        info!("Auth role '{}' was updated", name);
        Ok(())
    }

    async fn write_password_policy(&self, name: &str, policy: &str) -> Result<(), SecretStoreError> {
        let api_path = VaultPath::PasswordPolicy { name }.to_path();
        let request = self
            .request(reqwest::Method::PUT, &api_path)
            .json(&json!({ "policy": policy }));
        execute(request, &api_path, false).await?;
        Ok(())
    }

    async fn generate_password(
        &self,
        policy_name: &str,
    ) -> Result<Zeroizing<String>, SecretStoreError> {
        let api_path = VaultPath::PasswordGenerate { name: policy_name }.to_path();
        let response =
            execute(self.request(reqwest::Method::GET, &api_path), &api_path, false).await?;
        response
            .pointer("/data/password")
            .or_else(|| response.get("password"))
            .and_then(Value::as_str)
            .filter(|password| !password.is_empty())
            .map(|password| Zeroizing::new(password.to_string()))
            .ok_or_else(|| SecretStoreError::Malformed {
                path: api_path,
                reason: format!("cannot generate password for policy {policy_name}"),
            })
    }
}
