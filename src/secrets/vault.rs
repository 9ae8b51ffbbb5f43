//! Vault-compatible secret backend.
//!
//! Speaks the raw HTTP API of HashiCorp Vault / OpenBao: login via
//! `/v1/auth/{method}/login`, secret reads via `GET /v1/{path}`. Two
//! authentication methods are supported — AppRole (`role_id` + `secret_id`)
//! and JWT (`role` + a JWT taken inline from configuration or read from a
//! file). Session tokens are cached per (address, namespace, auth-config)
//! and renewed lazily once the renewal safety window is crossed; there is no
//! background refresh task.
//!
//! Secret values go through the backend's [`SecretValueCache`], so repeated
//! and concurrent reads of the same path share one network call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::cache::SecretValueCache;
use super::error::{Result, SecretsError};
use super::types::SecretString;
use crate::config::{VaultAuthMethod, VaultSettings};
use crate::observability::WarnGate;

/// Retry-after attached to transient Vault failures.
const VAULT_RETRY_AFTER_SECS: u64 = 15;

/// Lease seconds shaved off before the session is considered expired.
const SESSION_TTL_MARGIN_SECS: u64 = 5;

#[derive(Debug, Clone)]
struct VaultSession {
    token: SecretString,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    auth: Option<LoginAuth>,
}

#[derive(Debug, Deserialize)]
struct LoginAuth {
    client_token: Option<String>,
    #[serde(default)]
    lease_duration: u64,
}

/// Vault-compatible KV backend with lazy authentication.
pub struct VaultBackend {
    http: reqwest::Client,
    sessions: Arc<RwLock<HashMap<String, VaultSession>>>,
    cache: SecretValueCache,
    config_warnings: WarnGate,
}

impl std::fmt::Debug for VaultBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultBackend").field("http", &"[Client]").finish()
    }
}

impl VaultBackend {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Build against a caller-supplied HTTP client (tests point this at a
    /// mock server).
    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            cache: SecretValueCache::new(),
            config_warnings: WarnGate::new(),
        }
    }

    /// Fetch a secret string from `secret_path`, honoring the configured
    /// field extraction and value cache.
    pub async fn fetch_secret_string(
        &self,
        settings: &VaultSettings,
        secret_path: &str,
    ) -> Result<Option<String>> {
        let cache_key = format!(
            "{}|{}|{}",
            settings.session_key(),
            secret_path,
            settings.field.as_deref().unwrap_or("")
        );
        let ttl = settings.cache_ttl();

        self.cache
            .get_or_fetch(&cache_key, ttl, || self.fetch_uncached(settings, secret_path))
            .await
    }

    async fn fetch_uncached(
        &self,
        settings: &VaultSettings,
        secret_path: &str,
    ) -> Result<Option<String>> {
        let token = self.authenticate(settings).await?;

        let url = format!("{}/v1/{}", settings.address.trim_end_matches('/'), secret_path);
        debug!(path = %secret_path, "Fetching secret from Vault");

        let mut request = self.http.get(&url).header("X-Vault-Token", token.expose_secret());
        if let Some(namespace) = &settings.namespace {
            request = request.header("X-Vault-Namespace", namespace);
        }

        let response = request.send().await.map_err(|e| {
            SecretsError::unavailable(
                format!("Vault request failed: {}", e),
                VAULT_RETRY_AFTER_SECS,
            )
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(path = %secret_path, status = %status.as_u16(), "Vault returned non-success status");
            return Err(SecretsError::unavailable(
                format!("Vault returned status {}", status.as_u16()),
                VAULT_RETRY_AFTER_SECS,
            ));
        }

        let payload: Value = response.json().await.map_err(|e| {
            SecretsError::unavailable(
                format!("Vault response was not valid JSON: {}", e),
                VAULT_RETRY_AFTER_SECS,
            )
        })?;

        Ok(extract_field(&payload, settings.field.as_deref()))
    }

    /// Return a live session token, logging in if none is cached or the
    /// cached one is inside the renewal safety window.
    pub async fn authenticate(&self, settings: &VaultSettings) -> Result<SecretString> {
        let key = settings.session_key();
        let renew_window = settings.renew_window();
        let now = Instant::now();

        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(&key) {
                if session.expires_at > now + renew_window {
                    return Ok(session.token.clone());
                }
                debug!("Vault session inside renewal window, re-authenticating");
            }
        }

        let session = self.login(settings).await?;
        let token = session.token.clone();
        self.sessions.write().await.insert(key, session);
        Ok(token)
    }

    async fn login(&self, settings: &VaultSettings) -> Result<VaultSession> {
        let method = self.select_auth_method(settings)?;
        let (login_path, body) = match method {
            VaultAuthMethod::AppRole => {
                let role_id = self.require(settings.role_id.as_deref(), "VAULT_ROLE_ID")?;
                let secret_id = self.require(settings.secret_id.as_deref(), "VAULT_SECRET_ID")?;
                (
                    "auth/approle/login",
                    serde_json::json!({ "role_id": role_id, "secret_id": secret_id }),
                )
            }
            VaultAuthMethod::Jwt => {
                let role = self.require(settings.jwt_role.as_deref(), "VAULT_JWT_ROLE")?;
                let jwt = self.load_jwt(settings).await?;
                ("auth/jwt/login", serde_json::json!({ "role": role, "jwt": jwt }))
            }
        };

        let url = format!("{}/v1/{}", settings.address.trim_end_matches('/'), login_path);
        let mut request = self.http.post(&url).json(&body);
        if let Some(namespace) = &settings.namespace {
            request = request.header("X-Vault-Namespace", namespace);
        }

        let response = request.send().await.map_err(|e| {
            SecretsError::unavailable(format!("Vault login failed: {}", e), VAULT_RETRY_AFTER_SECS)
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(method = method.as_str(), status = %status.as_u16(), "Vault login returned non-success status");
            return Err(SecretsError::unavailable(
                format!("Vault login returned status {}", status.as_u16()),
                VAULT_RETRY_AFTER_SECS,
            ));
        }

        let login: LoginResponse = response.json().await.map_err(|e| {
            SecretsError::unavailable(
                format!("Vault login response was not valid JSON: {}", e),
                VAULT_RETRY_AFTER_SECS,
            )
        })?;

        let auth = login.auth.unwrap_or(LoginAuth { client_token: None, lease_duration: 0 });
        let Some(client_token) = auth.client_token else {
            return Err(SecretsError::unavailable(
                "Vault login response is missing a client token",
                VAULT_RETRY_AFTER_SECS,
            ));
        };

        let ttl_secs = auth.lease_duration.saturating_sub(SESSION_TTL_MARGIN_SECS).max(1);
        info!(
            method = method.as_str(),
            lease_duration = auth.lease_duration,
            session_ttl = ttl_secs,
            "Authenticated with Vault"
        );

        Ok(VaultSession {
            token: SecretString::new(client_token),
            expires_at: Instant::now() + Duration::from_secs(ttl_secs),
        })
    }

    fn select_auth_method(&self, settings: &VaultSettings) -> Result<VaultAuthMethod> {
        let Some(raw) = settings.auth_method.as_deref() else {
            return Err(self.config_error("VAULT_AUTH_METHOD is not set"));
        };
        VaultAuthMethod::parse(raw)
            .ok_or_else(|| self.config_error("VAULT_AUTH_METHOD is not 'approle' or 'jwt'"))
    }

    fn require(&self, value: Option<&str>, name: &'static str) -> Result<String> {
        value
            .map(str::to_string)
            .ok_or_else(|| self.config_error(&format!("{} is required for the selected Vault auth method", name)))
    }

    async fn load_jwt(&self, settings: &VaultSettings) -> Result<String> {
        if let Some(jwt) = &settings.jwt {
            return Ok(jwt.clone());
        }
        if let Some(path) = &settings.jwt_path {
            return tokio::fs::read_to_string(path)
                .await
                .map(|contents| contents.trim().to_string())
                .map_err(|e| self.config_error(&format!("failed to read VAULT_JWT_PATH: {}", e)));
        }
        Err(self.config_error("either VAULT_JWT or VAULT_JWT_PATH is required for jwt auth"))
    }

    /// Configuration errors are logged once per distinct reason; retrying
    /// them blindly cannot succeed.
    fn config_error(&self, reason: &str) -> SecretsError {
        if self.config_warnings.first(reason) {
            warn!(reason = %reason, "Vault backend configuration invalid");
        }
        SecretsError::config(reason)
    }
}

impl Default for VaultBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull the requested field out of a Vault read response.
///
/// The field is looked up in the `data` section first, then at the top
/// level. Without a field the whole `data` section (or the whole payload)
/// is serialized back into a string.
fn extract_field(payload: &Value, field: Option<&str>) -> Option<String> {
    let data = payload.get("data");

    match field {
        Some(field) => {
            let value = data.and_then(|d| d.get(field)).or_else(|| payload.get(field))?;
            Some(value_to_string(value))
        }
        None => {
            let section = data.unwrap_or(payload);
            if section.is_null() {
                return None;
            }
            Some(value_to_string(section))
        }
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(auth_method: Option<&str>) -> VaultSettings {
        VaultSettings {
            address: "http://127.0.0.1:8200".into(),
            namespace: None,
            auth_method: auth_method.map(str::to_string),
            role_id: None,
            secret_id: None,
            jwt_role: None,
            jwt: None,
            jwt_path: None,
            field: None,
            cache_ttl_secs: None,
            renew_window_secs: None,
        }
    }

    #[test]
    fn test_extract_named_field_from_data_section() {
        let payload = serde_json::json!({ "data": { "token_payload": "{\"tokens\":[]}" } });
        assert_eq!(
            extract_field(&payload, Some("token_payload")),
            Some("{\"tokens\":[]}".to_string())
        );
    }

    #[test]
    fn test_extract_named_field_falls_back_to_top_level() {
        let payload = serde_json::json!({ "value": "top-level" });
        assert_eq!(extract_field(&payload, Some("value")), Some("top-level".to_string()));
    }

    #[test]
    fn test_extract_without_field_serializes_data_section() {
        let payload = serde_json::json!({ "data": { "a": 1 } });
        assert_eq!(extract_field(&payload, None), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn test_extract_missing_field_is_none() {
        let payload = serde_json::json!({ "data": { "a": 1 } });
        assert_eq!(extract_field(&payload, Some("missing")), None);
    }

    #[test]
    fn test_non_string_field_is_serialized() {
        let payload = serde_json::json!({ "data": { "tokens": [1, 2] } });
        assert_eq!(extract_field(&payload, Some("tokens")), Some("[1,2]".to_string()));
    }

    #[tokio::test]
    async fn test_missing_auth_method_is_config_error() {
        let backend = VaultBackend::new();
        let err = backend.authenticate(&settings(None)).await.unwrap_err();
        assert!(matches!(err, SecretsError::Config { .. }));
    }

    #[tokio::test]
    async fn test_unknown_auth_method_is_config_error() {
        let backend = VaultBackend::new();
        let err = backend.authenticate(&settings(Some("ldap"))).await.unwrap_err();
        assert!(matches!(err, SecretsError::Config { .. }));
    }

    #[tokio::test]
    async fn test_approle_requires_both_ids() {
        let backend = VaultBackend::new();
        let mut s = settings(Some("approle"));
        s.role_id = Some("role".into());
        let err = backend.authenticate(&s).await.unwrap_err();
        assert!(matches!(err, SecretsError::Config { .. }));
        assert_eq!(err.metric_reason(), "configuration_invalid");
    }

    #[tokio::test]
    async fn test_jwt_requires_inline_or_path() {
        let backend = VaultBackend::new();
        let mut s = settings(Some("jwt"));
        s.jwt_role = Some("svc".into());
        let err = backend.authenticate(&s).await.unwrap_err();
        assert!(matches!(err, SecretsError::Config { .. }));
    }
}
