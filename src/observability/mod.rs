//! # Observability Infrastructure
//!
//! Health aggregation, metrics and log de-duplication for the auth/secrets
//! core. Nothing here ever logs secret values — only fingerprints, lengths
//! and boolean flags.

pub mod health;
pub mod logging;
pub mod metrics;

pub use health::{
    ComponentHealth, HealthAggregator, HealthReport, HealthSource, HealthStatus,
    StoreHealthSource,
};
pub use logging::{init_logging, LoggingConfig};
pub use metrics::MetricsRecorder;

use std::collections::HashSet;
use std::sync::Mutex;

/// One-shot log gate keyed by reason string.
///
/// Replaces module-level "already warned" statics: each owner carries its
/// own gate, so tests and multiple resolver instances do not leak state
/// into each other.
#[derive(Debug, Default)]
pub struct WarnGate {
    seen: Mutex<HashSet<String>>,
}

impl WarnGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// True exactly once per distinct reason.
    pub fn first(&self, reason: &str) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        seen.insert(reason.to_string())
    }
}
