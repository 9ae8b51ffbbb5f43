//! Token registry resolver.
//!
//! Merges up to three credential origins — process environment, the
//! persisted config store, and a remote secret — into one ordered list of
//! [`TokenRecord`]s, cached for a few seconds. Failure of one origin never
//! aborts the others; the resolver always returns a best-effort merged
//! snapshot plus structured diagnostics about what went wrong.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::payload::{self, PayloadCredential, PayloadParse, SecretPayload};
use super::permissions::{self, Permission};
use super::token::{
    self, TokenRecord, TokenSource, TokenWeakness,
};
use crate::config::{AuthSettings, SecretDriver, SettingsSource};
use crate::observability::{
    ComponentHealth, HealthSource, MetricsRecorder, WarnGate,
};
use crate::secrets::{SecretProvider, SecretsError};
use crate::storage::{ConfigStore, STORE_KEY_API_AUTH_TOKEN};

/// How long one resolution pass stays authoritative.
pub const REGISTRY_CACHE_TTL: Duration = Duration::from_secs(5);

/// Outcome of touching one credential origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    Ok,
    Error,
    Skipped,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Ok => "ok",
            SourceStatus::Error => "error",
            SourceStatus::Skipped => "skipped",
        }
    }
}

/// Structured issue codes attached to a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegistryIssue {
    RoleUnknown,
    PermissionsInvalid,
    SecretDriverMissing,
    ConfigurationInvalid,
    SecretUnavailable,
}

impl RegistryIssue {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryIssue::RoleUnknown => "role_unknown",
            RegistryIssue::PermissionsInvalid => "permissions_invalid",
            RegistryIssue::SecretDriverMissing => "secret_driver_missing",
            RegistryIssue::ConfigurationInvalid => "configuration_invalid",
            RegistryIssue::SecretUnavailable => "secret_unavailable",
        }
    }
}

/// Best-effort hint naming a backend the deployer probably meant to
/// configure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuggestedDriver {
    pub driver: SecretDriver,
    pub reason: &'static str,
}

/// Cached aggregate result of one resolution pass.
#[derive(Debug, Clone)]
pub struct TokenRegistryResolution {
    /// Source-priority order: environment, persisted store, remote secret.
    /// Verification takes the first structural match.
    pub records: Vec<TokenRecord>,
    pub weak_sources: BTreeSet<TokenSource>,
    pub store_status: SourceStatus,
    pub secret_status: SourceStatus,
    /// The backend that actually served tokens this pass.
    pub secret_driver: Option<SecretDriver>,
    pub suggested_secret_driver: Option<SuggestedDriver>,
    pub issues: BTreeSet<RegistryIssue>,
    pub resolved_at: Instant,
}

impl TokenRegistryResolution {
    fn is_fresh(&self) -> bool {
        self.resolved_at.elapsed() < REGISTRY_CACHE_TTL
    }
}

/// The identity a verified candidate resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub fingerprint: String,
    pub role: String,
    pub permissions: BTreeSet<Permission>,
    pub source: TokenSource,
}

/// Resolves and caches API credentials from all configured origins.
pub struct TokenRegistry {
    settings: Arc<dyn SettingsSource>,
    store: Arc<dyn ConfigStore>,
    provider: SecretProvider,
    cache: RwLock<Option<Arc<TokenRegistryResolution>>>,
    warnings: WarnGate,
    metrics: MetricsRecorder,
}

impl TokenRegistry {
    pub fn new(settings: Arc<dyn SettingsSource>, store: Arc<dyn ConfigStore>) -> Self {
        Self::with_secret_provider(settings, store, SecretProvider::new())
    }

    /// Build with an injected secret provider (tests point it at mocks).
    pub fn with_secret_provider(
        settings: Arc<dyn SettingsSource>,
        store: Arc<dyn ConfigStore>,
        provider: SecretProvider,
    ) -> Self {
        Self {
            settings,
            store,
            provider,
            cache: RwLock::new(None),
            warnings: WarnGate::new(),
            metrics: MetricsRecorder::new(),
        }
    }

    /// Resolve the current credential set, reusing a cached pass while it
    /// is fresh.
    pub async fn resolve(&self) -> Arc<TokenRegistryResolution> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            if cached.is_fresh() {
                self.metrics.record_registry_resolution(cached.records.len(), true);
                return Arc::clone(cached);
            }
        }

        let settings = self.settings.load();
        let resolution = Arc::new(self.resolve_uncached(&settings).await);
        self.metrics.record_registry_resolution(resolution.records.len(), false);
        *self.cache.write().await = Some(Arc::clone(&resolution));
        resolution
    }

    /// Drop the cached pass so the next [`resolve`](Self::resolve) hits the
    /// sources again.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    /// Check a candidate credential against the resolved records. Returns
    /// the identity of the first match, in constant time per record.
    pub async fn verify(&self, candidate: &str) -> Option<Identity> {
        let resolution = self.resolve().await;
        let matched = resolution.records.iter().find(|record| record.matches(candidate));
        self.metrics.record_token_verification(matched.is_some());

        match matched {
            Some(record) => {
                debug!(
                    fingerprint = %record.fingerprint,
                    source = record.source.as_str(),
                    "API token verified"
                );
                Some(Identity {
                    fingerprint: record.fingerprint.clone(),
                    role: record.role.clone(),
                    permissions: record.permissions.clone(),
                    source: record.source,
                })
            }
            None => {
                debug!(candidate_length = candidate.len(), "API token rejected");
                None
            }
        }
    }

    /// The plaintext token a trusted local caller may read back, if any.
    /// Suppressed entirely while the persisted store is failing, so stale
    /// or partial values are never surfaced.
    pub async fn get_exposable_token(&self) -> Option<String> {
        let resolution = self.resolve().await;
        if resolution.store_status == SourceStatus::Error {
            return None;
        }
        resolution
            .records
            .iter()
            .find_map(|record| record.exposable_value.as_ref())
            .map(|value| value.expose_secret().to_string())
    }

    pub async fn has_configured_api_tokens(&self) -> bool {
        !self.resolve().await.records.is_empty()
    }

    async fn resolve_uncached(&self, settings: &AuthSettings) -> TokenRegistryResolution {
        let mut records = Vec::new();
        let mut weak_sources = BTreeSet::new();
        let mut issues = BTreeSet::new();

        let digest_override_active =
            self.collect_environment(settings, &mut records, &mut weak_sources, &mut issues);

        let store_status = self
            .collect_store(
                settings,
                digest_override_active,
                &mut records,
                &mut weak_sources,
                &mut issues,
            )
            .await;

        let (secret_status, secret_driver) =
            self.collect_secret(settings, &mut records, &mut issues).await;

        let suggested_secret_driver = match settings.secret_driver {
            None => suggest_driver(settings),
            Some(_) => None,
        };

        debug!(
            token_count = records.len(),
            store_status = store_status.as_str(),
            secret_status = secret_status.as_str(),
            weak_source_count = weak_sources.len(),
            "Token registry resolution completed"
        );

        TokenRegistryResolution {
            records,
            weak_sources,
            store_status,
            secret_status,
            secret_driver,
            suggested_secret_driver,
            issues,
            resolved_at: Instant::now(),
        }
    }

    /// Environment origin. Returns whether a well-formed digest override is
    /// active, which suppresses the persisted-store token entirely.
    fn collect_environment(
        &self,
        settings: &AuthSettings,
        records: &mut Vec<TokenRecord>,
        weak_sources: &mut BTreeSet<TokenSource>,
        issues: &mut BTreeSet<RegistryIssue>,
    ) -> bool {
        let role = settings.env_role.as_deref().unwrap_or("admin");
        let explicit = settings.env_permissions.as_deref();

        let mut digest_override_active = false;
        if let Some(raw_digest) = settings.env_token_sha256.as_deref() {
            match token::normalize_digest(raw_digest) {
                Some(normalized) => {
                    let resolution = self.resolve_permissions(role, None, explicit, issues);
                    if let Some(record) = TokenRecord::from_digest_hex(
                        &normalized,
                        role,
                        resolution,
                        TokenSource::Environment,
                    ) {
                        records.push(record);
                        digest_override_active = true;
                    }
                }
                None => {
                    weak_sources.insert(TokenSource::Environment);
                    if self.warnings.first("env_digest_malformed") {
                        warn!(
                            provided_length = raw_digest.len(),
                            "Configured token digest is not 64 hex characters, ignoring"
                        );
                    }
                }
            }
        }

        if !digest_override_active {
            if let Some(plaintext) = settings.env_token.as_deref() {
                match token::validate_token_strength(plaintext) {
                    Ok(()) => {
                        let resolution = self.resolve_permissions(role, None, explicit, issues);
                        records.push(TokenRecord::from_plaintext(
                            plaintext,
                            role,
                            resolution,
                            TokenSource::Environment,
                            true,
                        ));
                    }
                    Err(weakness) => {
                        weak_sources.insert(TokenSource::Environment);
                        self.warn_weak_token("environment", weakness);
                    }
                }
            }
        }

        digest_override_active
    }

    async fn collect_store(
        &self,
        settings: &AuthSettings,
        digest_override_active: bool,
        records: &mut Vec<TokenRecord>,
        weak_sources: &mut BTreeSet<TokenSource>,
        issues: &mut BTreeSet<RegistryIssue>,
    ) -> SourceStatus {
        if let Err(e) = self.store.ready().await {
            if self.warnings.first("store_unavailable") {
                warn!(error = %e, "Config store is not ready, skipping stored token");
            }
            return SourceStatus::Error;
        }

        let stored = match self.store.get(STORE_KEY_API_AUTH_TOKEN).await {
            Ok(stored) => stored,
            Err(e) => {
                if self.warnings.first("store_read_failed") {
                    warn!(error = %e, "Reading stored token failed");
                }
                return SourceStatus::Error;
            }
        };

        let Some(plaintext) = stored else {
            return SourceStatus::Ok;
        };

        if digest_override_active {
            weak_sources.insert(TokenSource::PersistedStore);
            if self.warnings.first("store_token_overridden") {
                info!(
                    "Token digest override is set, ignoring the persisted store token"
                );
            }
            return SourceStatus::Ok;
        }

        match token::validate_token_strength(&plaintext) {
            Ok(()) => {
                let role = settings.store_role.as_deref().unwrap_or("admin");
                let resolution = self.resolve_permissions(
                    role,
                    None,
                    settings.store_permissions.as_deref(),
                    issues,
                );
                records.push(TokenRecord::from_plaintext(
                    &plaintext,
                    role,
                    resolution,
                    TokenSource::PersistedStore,
                    true,
                ));
            }
            Err(weakness) => {
                weak_sources.insert(TokenSource::PersistedStore);
                self.warn_weak_token("persisted-store", weakness);
            }
        }

        SourceStatus::Ok
    }

    async fn collect_secret(
        &self,
        settings: &AuthSettings,
        records: &mut Vec<TokenRecord>,
        issues: &mut BTreeSet<RegistryIssue>,
    ) -> (SourceStatus, Option<SecretDriver>) {
        let Some(secret_id) = settings.secret_id.as_deref() else {
            return (SourceStatus::Skipped, None);
        };

        let driver = match settings.secret_driver.as_deref() {
            None => {
                issues.insert(RegistryIssue::SecretDriverMissing);
                if self.warnings.first("secret_driver_missing") {
                    warn!(
                        "A secret id is configured but no secret driver is set, skipping remote tokens"
                    );
                }
                return (SourceStatus::Skipped, None);
            }
            Some(raw) => match SecretDriver::parse(raw) {
                Some(driver) => driver,
                None => {
                    issues.insert(RegistryIssue::ConfigurationInvalid);
                    if self.warnings.first("secret_driver_unknown") {
                        warn!(driver = %raw, "Unknown secret driver");
                    }
                    return (SourceStatus::Error, None);
                }
            },
        };

        let raw_payload =
            match self.provider.fetch_secret_string(driver, secret_id, settings).await {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    debug!(driver = driver.as_str(), "Configured secret has no value");
                    return (SourceStatus::Ok, None);
                }
                Err(e) => {
                    issues.insert(match e {
                        SecretsError::Config { .. } => RegistryIssue::ConfigurationInvalid,
                        _ => RegistryIssue::SecretUnavailable,
                    });
                    if self.warnings.first("secret_fetch_failed") {
                        warn!(driver = driver.as_str(), error = %e, "Fetching API tokens from secret backend failed");
                    }
                    return (SourceStatus::Error, None);
                }
            };

        let payload = match payload::parse_secret_payload(&raw_payload) {
            PayloadParse::Valid(payload) => payload,
            PayloadParse::Invalid { issues: problems } => {
                issues.insert(RegistryIssue::SecretUnavailable);
                if self.warnings.first("secret_payload_invalid") {
                    warn!(driver = driver.as_str(), problems = ?problems, "Secret payload failed validation, discarding all entries");
                }
                return (SourceStatus::Error, None);
            }
        };

        self.collect_payload_records(&payload, records, issues);
        (SourceStatus::Ok, Some(driver))
    }

    fn collect_payload_records(
        &self,
        payload: &SecretPayload,
        records: &mut Vec<TokenRecord>,
        issues: &mut BTreeSet<RegistryIssue>,
    ) {
        for entry in &payload.tokens {
            let resolution = self.resolve_permissions(
                &entry.role,
                Some(&payload.roles),
                entry.permissions.as_deref(),
                issues,
            );
            // Remote-secret records are never exposable, even when the
            // payload carried the plaintext.
            let record = match &entry.credential {
                PayloadCredential::Plaintext(plaintext) => Some(TokenRecord::from_plaintext(
                    plaintext,
                    &entry.role,
                    resolution,
                    TokenSource::RemoteSecret,
                    false,
                )),
                PayloadCredential::Sha256(digest) => TokenRecord::from_digest_hex(
                    digest,
                    &entry.role,
                    resolution,
                    TokenSource::RemoteSecret,
                ),
            };
            records.extend(record);
        }
    }

    fn resolve_permissions(
        &self,
        role: &str,
        role_overrides: Option<&std::collections::BTreeMap<String, Vec<String>>>,
        explicit: Option<&[String]>,
        issues: &mut BTreeSet<RegistryIssue>,
    ) -> BTreeSet<Permission> {
        let resolution = permissions::resolve(role, role_overrides, explicit);
        if resolution.role_is_unknown {
            issues.insert(RegistryIssue::RoleUnknown);
        }
        if !resolution.unknown_permissions.is_empty() {
            issues.insert(RegistryIssue::PermissionsInvalid);
        }
        resolution.permissions
    }

    fn warn_weak_token(&self, source: &str, weakness: TokenWeakness) {
        if self.warnings.first(&format!("weak_token:{source}")) {
            match weakness {
                TokenWeakness::Length(len) => warn!(
                    source = source,
                    provided_length = len,
                    "Rejecting weak API token: length out of bounds"
                ),
                TokenWeakness::Charset => warn!(
                    source = source,
                    "Rejecting weak API token: characters outside the allowed set"
                ),
            }
        }
    }
}

#[async_trait]
impl HealthSource for TokenRegistry {
    fn name(&self) -> &str {
        "api_auth_token"
    }

    /// Health view over the latest resolution, synthesizing issues that are
    /// not visible in the raw record list.
    async fn component_health(&self) -> ComponentHealth {
        let resolution = self.resolve().await;

        let mut health = if resolution.records.is_empty() {
            ComponentHealth::error("token_missing")
        } else {
            ComponentHealth::ok()
        };

        if !resolution.weak_sources.is_empty() {
            health = degrade(health).with_issue("token_weak");
        }
        if resolution.store_status == SourceStatus::Error {
            health = degrade(health).with_issue("store_unavailable");
        }
        if resolution.secret_status == SourceStatus::Error {
            health = degrade(health).with_issue("secret_unavailable");
        }

        let fingerprints: Vec<String> = resolution
            .records
            .iter()
            .map(|record| format!("{}:{}", record.source.as_str(), record.fingerprint))
            .collect();

        health = health
            .with_metadata("token_count", resolution.records.len().to_string())
            .with_metadata("store_status", resolution.store_status.as_str())
            .with_metadata("secret_status", resolution.secret_status.as_str())
            .with_metadata("tokens", fingerprints.join(","));

        if !resolution.weak_sources.is_empty() {
            let weak: Vec<&str> =
                resolution.weak_sources.iter().map(TokenSource::as_str).collect();
            health = health.with_metadata("weak_sources", weak.join(","));
        }
        if let Some(driver) = resolution.secret_driver {
            health = health.with_metadata("secret_driver", driver.as_str());
        }
        if let Some(suggested) = resolution.suggested_secret_driver {
            health = health
                .with_metadata("suggested_secret_driver", suggested.driver.as_str())
                .with_metadata("suggested_secret_driver_reason", suggested.reason);
        }
        for issue in &resolution.issues {
            health = health.with_issue(issue.as_str());
        }

        health
    }
}

/// Keep `error` sticky; only lift `ok` to `degraded`.
fn degrade(health: ComponentHealth) -> ComponentHealth {
    use crate::observability::HealthStatus;
    if health.status == HealthStatus::Ok {
        let mut degraded = health;
        degraded.status = HealthStatus::Degraded;
        degraded
    } else {
        health
    }
}

/// Guess which backend the deployer meant when no driver is configured.
fn suggest_driver(settings: &AuthSettings) -> Option<SuggestedDriver> {
    if settings.vault.is_some() {
        return Some(SuggestedDriver { driver: SecretDriver::Vault, reason: "VAULT_ADDR is set" });
    }
    if settings.aws.region.is_some() {
        return Some(SuggestedDriver {
            driver: SecretDriver::AwsSecretsManager,
            reason: "API_AUTH_SECRET_REGION is set",
        });
    }
    None
}
