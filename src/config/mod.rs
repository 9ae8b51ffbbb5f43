//! # Configuration Surface
//!
//! Typed view of the environment variables that drive API credential
//! resolution and the secret backends. Variable names are part of the
//! external contract and must not change.
//!
//! Backends follow the `from_env() -> Ok(None)` convention: a backend that
//! is simply not configured is not an error, only a malformed configuration
//! is.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// Token registry variables
pub const ENV_API_AUTH_TOKEN: &str = "API_AUTH_TOKEN";
pub const ENV_API_AUTH_TOKEN_SHA256: &str = "API_AUTH_TOKEN_SHA256";
pub const ENV_API_AUTH_ROLE: &str = "API_AUTH_ROLE";
pub const ENV_API_AUTH_PERMISSIONS: &str = "API_AUTH_PERMISSIONS";
pub const ENV_API_AUTH_STORE_ROLE: &str = "API_AUTH_STORE_ROLE";
pub const ENV_API_AUTH_STORE_PERMISSIONS: &str = "API_AUTH_STORE_PERMISSIONS";

// Secret source selection
pub const ENV_API_AUTH_SECRET_DRIVER: &str = "API_AUTH_SECRET_DRIVER";
pub const ENV_API_AUTH_SECRET_ID: &str = "API_AUTH_SECRET_ID";
pub const ENV_API_AUTH_SECRET_REGION: &str = "API_AUTH_SECRET_REGION";
pub const ENV_API_AUTH_SECRET_ENDPOINT: &str = "API_AUTH_SECRET_ENDPOINT";
pub const ENV_API_AUTH_SECRET_TTL_SECONDS: &str = "API_AUTH_SECRET_TTL_SECONDS";

// Vault-compatible backend
pub const ENV_VAULT_ADDR: &str = "VAULT_ADDR";
pub const ENV_VAULT_NAMESPACE: &str = "VAULT_NAMESPACE";
pub const ENV_VAULT_AUTH_METHOD: &str = "VAULT_AUTH_METHOD";
pub const ENV_VAULT_ROLE_ID: &str = "VAULT_ROLE_ID";
pub const ENV_VAULT_SECRET_ID: &str = "VAULT_SECRET_ID";
pub const ENV_VAULT_JWT_ROLE: &str = "VAULT_JWT_ROLE";
pub const ENV_VAULT_JWT: &str = "VAULT_JWT";
pub const ENV_VAULT_JWT_PATH: &str = "VAULT_JWT_PATH";
pub const ENV_VAULT_FIELD: &str = "VAULT_FIELD";
pub const ENV_VAULT_CACHE_TTL_SECONDS: &str = "VAULT_CACHE_TTL_SECONDS";
pub const ENV_VAULT_TOKEN_RENEW_SECONDS: &str = "VAULT_TOKEN_RENEW_SECONDS";

/// Default TTL for cached secret values.
pub const DEFAULT_SECRET_TTL: Duration = Duration::from_secs(60);
/// Upper bound for configurable secret value TTLs.
pub const MAX_SECRET_TTL: Duration = Duration::from_secs(3600);
/// Safety window subtracted from the Vault session lifetime before re-login.
pub const DEFAULT_VAULT_RENEW_WINDOW: Duration = Duration::from_secs(60);

/// Known secret backend drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecretDriver {
    AwsSecretsManager,
    Vault,
}

impl SecretDriver {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretDriver::AwsSecretsManager => "aws-secrets-manager",
            SecretDriver::Vault => "vault",
        }
    }

    /// Parse a driver name as it appears in `API_AUTH_SECRET_DRIVER`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "aws-secrets-manager" => Some(SecretDriver::AwsSecretsManager),
            "vault" => Some(SecretDriver::Vault),
            _ => None,
        }
    }
}

impl std::fmt::Display for SecretDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the cloud secret manager backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AwsSettings {
    /// Cloud region; the SDK default chain applies when unset.
    pub region: Option<String>,
    /// Endpoint override, mainly for localstack-style test targets.
    pub endpoint: Option<String>,
}

impl AwsSettings {
    pub fn from_env() -> Self {
        Self {
            region: read_env(ENV_API_AUTH_SECRET_REGION),
            endpoint: read_env(ENV_API_AUTH_SECRET_ENDPOINT),
        }
    }

    /// Composite cache key for the per-(region, endpoint) client cache.
    pub fn client_key(&self) -> String {
        format!(
            "{}|{}",
            self.region.as_deref().unwrap_or("default"),
            self.endpoint.as_deref().unwrap_or("default")
        )
    }
}

/// Vault authentication methods supported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VaultAuthMethod {
    AppRole,
    Jwt,
}

impl VaultAuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            VaultAuthMethod::AppRole => "approle",
            VaultAuthMethod::Jwt => "jwt",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "approle" => Some(VaultAuthMethod::AppRole),
            "jwt" => Some(VaultAuthMethod::Jwt),
            _ => None,
        }
    }
}

/// Configuration for the Vault-compatible backend.
///
/// `from_env` returns `None` when `VAULT_ADDR` is absent; every other field
/// is optional at parse time and validated by the backend when a login is
/// actually attempted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VaultSettings {
    pub address: String,
    pub namespace: Option<String>,
    /// Raw auth method string; unknown values surface as configuration
    /// errors at login time, not at parse time.
    pub auth_method: Option<String>,
    pub role_id: Option<String>,
    pub secret_id: Option<String>,
    pub jwt_role: Option<String>,
    pub jwt: Option<String>,
    pub jwt_path: Option<String>,
    pub field: Option<String>,
    pub cache_ttl_secs: Option<u64>,
    pub renew_window_secs: Option<u64>,
}

impl VaultSettings {
    pub fn from_env() -> Option<Self> {
        let address = read_env(ENV_VAULT_ADDR)?;
        Some(Self {
            address,
            namespace: read_env(ENV_VAULT_NAMESPACE),
            auth_method: read_env(ENV_VAULT_AUTH_METHOD),
            role_id: read_env(ENV_VAULT_ROLE_ID),
            secret_id: read_env(ENV_VAULT_SECRET_ID),
            jwt_role: read_env(ENV_VAULT_JWT_ROLE),
            jwt: read_env(ENV_VAULT_JWT),
            jwt_path: read_env(ENV_VAULT_JWT_PATH),
            field: read_env(ENV_VAULT_FIELD),
            cache_ttl_secs: read_env(ENV_VAULT_CACHE_TTL_SECONDS).and_then(|v| v.parse().ok()),
            renew_window_secs: read_env(ENV_VAULT_TOKEN_RENEW_SECONDS)
                .and_then(|v| v.parse().ok()),
        })
    }

    /// Effective value-cache TTL, clamped to the global cap.
    pub fn cache_ttl(&self) -> Duration {
        clamp_ttl(self.cache_ttl_secs)
    }

    /// Safety window subtracted from the session lifetime.
    pub fn renew_window(&self) -> Duration {
        self.renew_window_secs.map(Duration::from_secs).unwrap_or(DEFAULT_VAULT_RENEW_WINDOW)
    }

    /// Composite key identifying one authentication context. Sessions are
    /// cached per (address, namespace, auth-config). Credential fields are
    /// folded into a digest so the key stays safe to log: any change to the
    /// configured credentials yields a distinct session.
    pub fn session_key(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [&self.role_id, &self.secret_id, &self.jwt_role, &self.jwt, &self.jwt_path] {
            hasher.update(part.as_deref().unwrap_or("").as_bytes());
            hasher.update([0u8]);
        }
        let auth_digest = hex::encode(&hasher.finalize()[..8]);

        format!(
            "{}|{}|{}|{}",
            self.address,
            self.namespace.as_deref().unwrap_or(""),
            self.auth_method.as_deref().unwrap_or(""),
            auth_digest
        )
    }
}

/// Everything the token registry reads per resolution pass.
#[derive(Debug, Clone, Default)]
pub struct AuthSettings {
    pub env_token: Option<String>,
    pub env_token_sha256: Option<String>,
    pub env_role: Option<String>,
    pub env_permissions: Option<Vec<String>>,
    pub store_role: Option<String>,
    pub store_permissions: Option<Vec<String>>,
    /// Raw driver string; unknown names are a `configuration_invalid` issue.
    pub secret_driver: Option<String>,
    pub secret_id: Option<String>,
    pub secret_ttl_secs: Option<u64>,
    pub aws: AwsSettings,
    pub vault: Option<VaultSettings>,
}

impl AuthSettings {
    pub fn from_env() -> Self {
        Self {
            env_token: read_env(ENV_API_AUTH_TOKEN),
            env_token_sha256: read_env(ENV_API_AUTH_TOKEN_SHA256),
            env_role: read_env(ENV_API_AUTH_ROLE),
            env_permissions: read_env(ENV_API_AUTH_PERMISSIONS).map(|v| split_list(&v)),
            store_role: read_env(ENV_API_AUTH_STORE_ROLE),
            store_permissions: read_env(ENV_API_AUTH_STORE_PERMISSIONS).map(|v| split_list(&v)),
            secret_driver: read_env(ENV_API_AUTH_SECRET_DRIVER),
            secret_id: read_env(ENV_API_AUTH_SECRET_ID),
            secret_ttl_secs: read_env(ENV_API_AUTH_SECRET_TTL_SECONDS).and_then(|v| v.parse().ok()),
            aws: AwsSettings::from_env(),
            vault: VaultSettings::from_env(),
        }
    }

    /// Effective cloud value-cache TTL, clamped to the global cap.
    pub fn secret_ttl(&self) -> Duration {
        clamp_ttl(self.secret_ttl_secs)
    }
}

/// Seam for loading settings. Production uses [`EnvSettingsSource`]; tests
/// inject fixed settings instead of mutating process environment.
pub trait SettingsSource: Send + Sync {
    fn load(&self) -> AuthSettings;
}

/// Reads settings from the process environment on every load.
#[derive(Debug, Clone, Default)]
pub struct EnvSettingsSource;

impl SettingsSource for EnvSettingsSource {
    fn load(&self) -> AuthSettings {
        AuthSettings::from_env()
    }
}

/// Fixed settings, for embedding and tests.
#[derive(Debug, Clone)]
pub struct StaticSettingsSource(pub AuthSettings);

impl SettingsSource for StaticSettingsSource {
    fn load(&self) -> AuthSettings {
        self.0.clone()
    }
}

fn read_env(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

fn clamp_ttl(secs: Option<u64>) -> Duration {
    match secs {
        Some(secs) => Duration::from_secs(secs).min(MAX_SECRET_TTL),
        None => DEFAULT_SECRET_TTL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_parse() {
        assert_eq!(SecretDriver::parse("aws-secrets-manager"), Some(SecretDriver::AwsSecretsManager));
        assert_eq!(SecretDriver::parse("vault"), Some(SecretDriver::Vault));
        assert_eq!(SecretDriver::parse("gcp"), None);
        assert_eq!(SecretDriver::AwsSecretsManager.as_str(), "aws-secrets-manager");
    }

    #[test]
    fn test_ttl_clamping() {
        let mut settings = AuthSettings::default();
        assert_eq!(settings.secret_ttl(), DEFAULT_SECRET_TTL);

        settings.secret_ttl_secs = Some(120);
        assert_eq!(settings.secret_ttl(), Duration::from_secs(120));

        settings.secret_ttl_secs = Some(86_400);
        assert_eq!(settings.secret_ttl(), MAX_SECRET_TTL);
    }

    #[test]
    fn test_permission_list_parsing() {
        assert_eq!(
            split_list("config.read, health.read ,,chat.completions"),
            vec!["config.read", "health.read", "chat.completions"]
        );
        assert!(split_list("  ").is_empty());
    }

    #[test]
    fn test_aws_client_key() {
        let settings = AwsSettings { region: Some("eu-west-1".into()), endpoint: None };
        assert_eq!(settings.client_key(), "eu-west-1|default");
        assert_eq!(AwsSettings::default().client_key(), "default|default");
    }

    #[test]
    fn test_vault_session_key_distinguishes_auth_config() {
        let base = VaultSettings {
            address: "http://127.0.0.1:8200".into(),
            namespace: None,
            auth_method: Some("approle".into()),
            role_id: Some("role-a".into()),
            secret_id: Some("secret".into()),
            jwt_role: None,
            jwt: None,
            jwt_path: None,
            field: None,
            cache_ttl_secs: None,
            renew_window_secs: None,
        };
        let mut other = base.clone();
        other.role_id = Some("role-b".into());
        assert_ne!(base.session_key(), other.session_key());

        // Every credential field participates, not just the role ids.
        let mut rotated = base.clone();
        rotated.secret_id = Some("rotated".into());
        assert_ne!(base.session_key(), rotated.session_key());

        let mut jwt_a = base.clone();
        jwt_a.auth_method = Some("jwt".into());
        jwt_a.jwt = Some("token-a".into());
        let mut jwt_b = jwt_a.clone();
        jwt_b.jwt = Some("token-b".into());
        assert_ne!(jwt_a.session_key(), jwt_b.session_key());
    }

    #[test]
    fn test_vault_session_key_never_contains_credentials() {
        let settings = VaultSettings {
            address: "http://127.0.0.1:8200".into(),
            namespace: None,
            auth_method: Some("approle".into()),
            role_id: Some("role-a".into()),
            secret_id: Some("approle-secret-value".into()),
            jwt_role: None,
            jwt: Some("jwt-token-value".into()),
            jwt_path: None,
            field: None,
            cache_ttl_secs: None,
            renew_window_secs: None,
        };
        let key = settings.session_key();
        assert!(!key.contains("approle-secret-value"));
        assert!(!key.contains("jwt-token-value"));
    }

    #[test]
    fn test_vault_auth_method_parse() {
        assert_eq!(VaultAuthMethod::parse("approle"), Some(VaultAuthMethod::AppRole));
        assert_eq!(VaultAuthMethod::parse("jwt"), Some(VaultAuthMethod::Jwt));
        assert_eq!(VaultAuthMethod::parse("ldap"), None);
    }
}
