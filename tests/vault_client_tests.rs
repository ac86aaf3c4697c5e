//! Vault HTTP client against an in-process mock Vault
//!
//! The mock mounts the same route constants the client builds its paths
//! from, so a drift between the two shows up as a 404 here.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use paths::vault::{
    AUTH_LOGIN_ROUTE, AUTH_ROLE_ROUTE, KV_DATA_ROUTE, PASSWORD_GENERATE_ROUTE,
    PASSWORD_POLICY_ROUTE, SYS_POLICY_ROUTE,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use zookeeper_operator::crd::VaultConfig;
use zookeeper_operator::provider::{
    SecretFields, SecretStore, SecretStoreConnector, SecretStoreError, VaultConnector,
};

const JWT: &str = "service-account-jwt";
const CLIENT_TOKEN: &str = "s.mock-client-token";

#[derive(Debug, Default)]
struct MockVault {
    secrets: BTreeMap<String, Vec<Value>>,
    policies: BTreeMap<String, String>,
    roles: BTreeMap<String, Value>,
    password_policies: BTreeMap<String, String>,
    logins: Vec<Value>,
}

type Shared = Arc<Mutex<MockVault>>;

fn authorized(headers: &HeaderMap) -> Result<(), Response> {
    match headers.get("X-Vault-Token").and_then(|v| v.to_str().ok()) {
        Some(CLIENT_TOKEN) => Ok(()),
        _ => Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "errors": ["permission denied"] })),
        )
            .into_response()),
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "errors": [] }))).into_response()
}

async fn login(
    State(vault): State<Shared>,
    Path(_method): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    vault.lock().unwrap().logins.push(body.clone());
    if body["jwt"] != JWT {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "errors": ["invalid JWT"] })),
        )
            .into_response();
    }
    Json(json!({ "auth": { "client_token": CLIENT_TOKEN } })).into_response()
}

async fn read_secret(
    State(vault): State<Shared>,
    headers: HeaderMap,
    Path((mount, name)): Path<(String, String)>,
) -> Response {
    if let Err(denied) = authorized(&headers) {
        return denied;
    }
    let vault = vault.lock().unwrap();
    match vault.secrets.get(&format!("{mount}/{name}")) {
        Some(versions) => Json(json!({
            "data": {
                "data": versions.last(),
                "metadata": { "version": versions.len() },
            }
        }))
        .into_response(),
        None => not_found(),
    }
}

async fn write_secret(
    State(vault): State<Shared>,
    headers: HeaderMap,
    Path((mount, name)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    if let Err(denied) = authorized(&headers) {
        return denied;
    }
    let mut vault = vault.lock().unwrap();
    let versions = vault.secrets.entry(format!("{mount}/{name}")).or_default();
    versions.push(body["data"].clone());
    Json(json!({ "data": { "version": versions.len() } })).into_response()
}

async fn read_policy(
    State(vault): State<Shared>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    if let Err(denied) = authorized(&headers) {
        return denied;
    }
    match vault.lock().unwrap().policies.get(&name) {
        Some(rules) => Json(json!({ "name": name, "rules": rules })).into_response(),
        None => not_found(),
    }
}

async fn write_policy(
    State(vault): State<Shared>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if let Err(denied) = authorized(&headers) {
        return denied;
    }
    let policy = body["policy"].as_str().unwrap_or_default().to_string();
    vault.lock().unwrap().policies.insert(name, policy);
    StatusCode::NO_CONTENT.into_response()
}

async fn read_role(
    State(vault): State<Shared>,
    headers: HeaderMap,
    Path((_method, role)): Path<(String, String)>,
) -> Response {
    if let Err(denied) = authorized(&headers) {
        return denied;
    }
    match vault.lock().unwrap().roles.get(&role) {
        Some(body) => Json(json!({ "data": body })).into_response(),
        None => not_found(),
    }
}

async fn write_role(
    State(vault): State<Shared>,
    headers: HeaderMap,
    Path((_method, role)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    if let Err(denied) = authorized(&headers) {
        return denied;
    }
    vault.lock().unwrap().roles.insert(role, body);
    StatusCode::NO_CONTENT.into_response()
}

async fn write_password_policy(
    State(vault): State<Shared>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if let Err(denied) = authorized(&headers) {
        return denied;
    }
    let policy = body["policy"].as_str().unwrap_or_default().to_string();
    vault.lock().unwrap().password_policies.insert(name, policy);
    StatusCode::NO_CONTENT.into_response()
}

async fn generate_password(
    State(vault): State<Shared>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    if let Err(denied) = authorized(&headers) {
        return denied;
    }
    if !vault.lock().unwrap().password_policies.contains_key(&name) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "errors": ["policy does not exist"] })),
        )
            .into_response();
    }
    Json(json!({ "data": { "password": "Mock-Generated-1" } })).into_response()
}

/// Serve the mock on an ephemeral port and return its base URL
async fn start_mock_vault(vault: Shared) -> String {
    let app = Router::new()
        .route(AUTH_LOGIN_ROUTE, post(login))
        .route(KV_DATA_ROUTE, get(read_secret).post(write_secret))
        .route(SYS_POLICY_ROUTE, get(read_policy).put(write_policy))
        .route(AUTH_ROLE_ROUTE, get(read_role).post(write_role))
        .route(PASSWORD_POLICY_ROUTE, axum::routing::put(write_password_policy))
        .route(PASSWORD_GENERATE_ROUTE, get(generate_password))
        .with_state(vault);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{address}")
}

fn token_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{contents}").unwrap();
    file
}

fn vault_config(url: String) -> VaultConfig {
    VaultConfig {
        enabled: true,
        url,
        method: "kubernetes".to_string(),
        role: "zookeeper-operator".to_string(),
        path: "secret".to_string(),
        ..VaultConfig::default()
    }
}

async fn connect(vault: &Shared, jwt: &str) -> Result<Arc<dyn SecretStore>, SecretStoreError> {
    let url = start_mock_vault(vault.clone()).await;
    let token = token_file(jwt);
    VaultConnector::new(token.path())?
        .connect(&vault_config(url))
        .await
}

#[tokio::test]
async fn login_sends_the_trimmed_service_account_jwt() {
    let vault = Shared::default();

    connect(&vault, JWT).await.unwrap();

    let logins = vault.lock().unwrap().logins.clone();
    assert_eq!(
        logins,
        vec![json!({ "jwt": JWT, "role": "zookeeper-operator" })]
    );
}

#[tokio::test]
async fn rejected_login_reports_the_vault_status() {
    let vault = Shared::default();

    let error = connect(&vault, "stale-jwt").await.unwrap_err();

    assert!(
        matches!(error, SecretStoreError::Status { status: 400, .. }),
        "{error}"
    );
}

#[tokio::test]
async fn unreadable_token_file_fails_before_any_request() {
    let vault = Shared::default();
    let url = start_mock_vault(vault.clone()).await;

    let error = VaultConnector::new("/nonexistent/serviceaccount/token")
        .unwrap()
        .connect(&vault_config(url))
        .await
        .unwrap_err();

    assert!(matches!(error, SecretStoreError::Token { .. }), "{error}");
    assert!(vault.lock().unwrap().logins.is_empty());
}

#[tokio::test]
async fn kv_secrets_are_versioned() {
    let vault = Shared::default();
    let client = connect(&vault, JWT).await.unwrap();
    let name = "zk.zookeeper-service/admin-credentials";

    assert_eq!(client.read_secret("secret", name).await.unwrap(), None);

    let first = SecretFields::from([
        ("username".to_string(), "admin".to_string()),
        ("password".to_string(), "one".to_string()),
    ]);
    let second = SecretFields::from([
        ("username".to_string(), "admin".to_string()),
        ("password".to_string(), "two".to_string()),
    ]);
    assert_eq!(client.write_secret("secret", name, &first).await.unwrap(), 1);
    assert_eq!(client.write_secret("secret", name, &second).await.unwrap(), 2);

    assert_eq!(
        client.read_secret("secret", name).await.unwrap(),
        Some(second)
    );
}

#[tokio::test]
async fn policies_and_roles_read_back_what_was_written() {
    let vault = Shared::default();
    let client = connect(&vault, JWT).await.unwrap();
    let policy = "zk.zookeeper-service-admin-policy";
    let role = "zk.zookeeper-service-role";

    assert_eq!(client.read_policy(policy).await.unwrap(), None);
    assert!(client.read_auth_role(role).await.unwrap().is_none());

    let rules = r#"path "secret/data/zk.zookeeper-service/*" { capabilities = ["read"] }"#;
    client.write_policy(policy, rules).await.unwrap();
    client
        .write_auth_role(role, &json!({ "bound_service_account_names": ["zk"] }))
        .await
        .unwrap();

    assert_eq!(
        client.read_policy(policy).await.unwrap().as_deref(),
        Some(rules)
    );
    assert!(client.read_auth_role(role).await.unwrap().is_some());
}

#[tokio::test]
async fn passwords_come_from_the_named_policy() {
    let vault = Shared::default();
    let client = connect(&vault, JWT).await.unwrap();
    let policy = "zk.zookeeper-service-password-policy";

    let missing = client.generate_password(policy).await.unwrap_err();
    assert!(
        matches!(missing, SecretStoreError::Status { status: 400, .. }),
        "{missing}"
    );

    client
        .write_password_policy(policy, "length = 20")
        .await
        .unwrap();
    let password = client.generate_password(policy).await.unwrap();
    assert_eq!(password.as_str(), "Mock-Generated-1");
}
