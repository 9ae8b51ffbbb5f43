//! Secrets provider facade.
//!
//! Single entry point for fetching remote secrets: dispatches to the
//! backend selected by driver name, normalizes backend failures into
//! [`SecretsError::Unavailable`] and records a failure metric tagged by
//! driver and a stable reason before any error reaches the caller.

use tracing::{debug, error};

use super::aws::AwsSecretsBackend;
use super::error::{Result, SecretsError};
use super::vault::VaultBackend;
use crate::config::{AuthSettings, SecretDriver};
use crate::observability::MetricsRecorder;

/// Dispatches secret fetches to the configured backend.
#[derive(Debug, Default)]
pub struct SecretProvider {
    aws: AwsSecretsBackend,
    vault: VaultBackend,
    metrics: MetricsRecorder,
}

impl SecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build with a pre-configured Vault backend (tests point it at a mock
    /// server).
    pub fn with_vault_backend(vault: VaultBackend) -> Self {
        Self { aws: AwsSecretsBackend::new(), vault, metrics: MetricsRecorder::new() }
    }

    /// Fetch the secret identified by `secret_id` from `driver`.
    ///
    /// Transient backend failures surface as `Unavailable` with a
    /// retry-after; configuration problems as `Config`; anything else is
    /// unexpected and rethrown after the failure metric is recorded.
    pub async fn fetch_secret_string(
        &self,
        driver: SecretDriver,
        secret_id: &str,
        settings: &AuthSettings,
    ) -> Result<Option<String>> {
        let result = match driver {
            SecretDriver::AwsSecretsManager => {
                self.aws
                    .fetch_secret_string(&settings.aws, secret_id, settings.secret_ttl())
                    .await
            }
            SecretDriver::Vault => match settings.vault.as_ref() {
                Some(vault_settings) => {
                    self.vault.fetch_secret_string(vault_settings, secret_id).await
                }
                None => {
                    Err(SecretsError::config("driver is 'vault' but VAULT_ADDR is not set"))
                }
            },
        };

        match &result {
            Ok(value) => {
                debug!(
                    driver = driver.as_str(),
                    found = value.is_some(),
                    "Secret provider fetch completed"
                );
            }
            Err(err) => {
                let reason = err.metric_reason();
                self.metrics.record_secret_provider_failure(driver.as_str(), reason);
                if matches!(err, SecretsError::Unexpected { .. }) {
                    error!(driver = driver.as_str(), error = %err, "Unexpected secret provider failure");
                }
            }
        }

        result
    }
}
