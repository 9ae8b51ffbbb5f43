//! # Metrics Collection
//!
//! Counter-style recorders for the auth/secrets core, built on the
//! `metrics` facade. The surrounding application installs whatever exporter
//! it wants; without one these calls are no-ops.

use metrics::counter;

/// Metrics recorder for credential resolution and secret fetching.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Record a secret provider failure tagged by driver and a stable
    /// reason (`unavailable`, `unexpected_error`, `configuration_invalid`).
    pub fn record_secret_provider_failure(&self, driver: &str, reason: &str) {
        let labels = [("driver", driver.to_string()), ("reason", reason.to_string())];
        counter!("secret_provider_failures_total", &labels).increment(1);
    }

    /// Record one token registry resolution pass.
    pub fn record_registry_resolution(&self, token_count: usize, from_cache: bool) {
        let labels = [("cached", from_cache.to_string())];
        counter!("token_registry_resolutions_total", &labels).increment(1);

        let count_labels = [("token_count", token_count.to_string())];
        counter!("token_registry_tokens_resolved_total", &count_labels).increment(1);
    }

    /// Record a token verification outcome.
    pub fn record_token_verification(&self, matched: bool) {
        let labels = [("outcome", if matched { "matched" } else { "rejected" }.to_string())];
        counter!("token_verifications_total", &labels).increment(1);
    }

    /// Record a circuit breaker transition.
    pub fn record_breaker_transition(&self, breaker: &str, state: &str) {
        let labels = [("breaker", breaker.to_string()), ("state", state.to_string())];
        counter!("circuit_breaker_transitions_total", &labels).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorders_are_noops_without_exporter() {
        let recorder = MetricsRecorder::new();
        recorder.record_secret_provider_failure("vault", "unavailable");
        recorder.record_registry_resolution(2, false);
        recorder.record_token_verification(true);
        recorder.record_breaker_transition("vault", "open");
    }
}
