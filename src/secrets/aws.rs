//! AWS Secrets Manager backend.
//!
//! SDK clients are cached per (region, endpoint) and reused across calls;
//! secret values go through the backend's [`SecretValueCache`], which also
//! provides the single-flight and negative-caching discipline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use aws_sdk_secretsmanager::Client;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::cache::SecretValueCache;
use super::error::{Result, SecretsError};
use crate::config::AwsSettings;

/// Cap applied to the retry-after attached to fetch failures.
const FAILURE_RETRY_CAP_SECS: u64 = 30;

/// AWS Secrets Manager client with per-(region, endpoint) client reuse.
pub struct AwsSecretsBackend {
    clients: Arc<RwLock<HashMap<String, Client>>>,
    cache: SecretValueCache,
}

impl std::fmt::Debug for AwsSecretsBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsSecretsBackend").field("clients", &"[..]").finish()
    }
}

impl AwsSecretsBackend {
    pub fn new() -> Self {
        Self {
            clients: Arc::new(RwLock::new(HashMap::new())),
            cache: SecretValueCache::new(),
        }
    }

    /// Fetch `secret_id` as a string, caching the value for `ttl`.
    pub async fn fetch_secret_string(
        &self,
        settings: &AwsSettings,
        secret_id: &str,
        ttl: Duration,
    ) -> Result<Option<String>> {
        let cache_key = format!("{}|{}", settings.client_key(), secret_id);

        self.cache
            .get_or_fetch(&cache_key, ttl, || self.fetch_uncached(settings, secret_id, ttl))
            .await
    }

    async fn fetch_uncached(
        &self,
        settings: &AwsSettings,
        secret_id: &str,
        ttl: Duration,
    ) -> Result<Option<String>> {
        let client = self.client(settings).await;
        let retry_after = ttl.as_secs().min(FAILURE_RETRY_CAP_SECS).max(1);

        debug!(secret_id = %secret_id, "Fetching secret from AWS Secrets Manager");

        match client.get_secret_value().secret_id(secret_id).send().await {
            Ok(output) => Ok(output.secret_string().map(str::to_string)),
            Err(error) => {
                let service_error = error.into_service_error();
                if service_error.is_resource_not_found_exception() {
                    debug!(secret_id = %secret_id, "Secret not found in AWS Secrets Manager");
                    return Ok(None);
                }
                warn!(
                    secret_id = %secret_id,
                    error = %service_error,
                    "AWS Secrets Manager request failed"
                );
                Err(SecretsError::unavailable(
                    format!("AWS Secrets Manager request failed: {}", service_error),
                    retry_after,
                ))
            }
        }
    }

    /// Reuse or build the SDK client for this (region, endpoint) pair.
    async fn client(&self, settings: &AwsSettings) -> Client {
        let key = settings.client_key();

        if let Some(client) = self.clients.read().await.get(&key) {
            return client.clone();
        }

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &settings.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        let shared_config = loader.load().await;

        let mut builder = aws_sdk_secretsmanager::config::Builder::from(&shared_config);
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        let client = Client::from_conf(builder.build());

        info!(
            region = settings.region.as_deref().unwrap_or("default"),
            endpoint_override = settings.endpoint.is_some(),
            "Initialized AWS Secrets Manager client"
        );

        self.clients.write().await.entry(key).or_insert(client).clone()
    }

    /// Number of distinct SDK clients held, for diagnostics.
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

impl Default for AwsSecretsBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_is_capped() {
        assert_eq!(Duration::from_secs(300).as_secs().min(FAILURE_RETRY_CAP_SECS).max(1), 30);
        assert_eq!(Duration::from_secs(10).as_secs().min(FAILURE_RETRY_CAP_SECS).max(1), 10);
        assert_eq!(Duration::from_secs(0).as_secs().min(FAILURE_RETRY_CAP_SECS).max(1), 1);
    }

    #[tokio::test]
    async fn test_client_cache_starts_empty() {
        let backend = AwsSecretsBackend::new();
        assert_eq!(backend.client_count().await, 0);
    }
}
