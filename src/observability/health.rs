//! # Health Aggregation
//!
//! Rolls per-component health into one overall signal for the `/healthz`
//! style endpoint owned by the surrounding application. Components are
//! pull-based: nothing here runs on the request hot path.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::storage::ConfigStore;

/// Health status for a component or the whole system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    Initializing,
    Degraded,
    Error,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "ok",
            HealthStatus::Initializing => "initializing",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Error => "error",
        }
    }
}

/// Health view of one component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ComponentHealth {
    pub fn new(status: HealthStatus) -> Self {
        Self { status, issues: Vec::new(), metadata: BTreeMap::new() }
    }

    pub fn ok() -> Self {
        Self::new(HealthStatus::Ok)
    }

    pub fn degraded(issue: impl Into<String>) -> Self {
        Self::new(HealthStatus::Degraded).with_issue(issue)
    }

    pub fn error(issue: impl Into<String>) -> Self {
        Self::new(HealthStatus::Error).with_issue(issue)
    }

    pub fn with_issue(mut self, issue: impl Into<String>) -> Self {
        self.issues.push(issue.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Component that can report its own health.
#[async_trait]
pub trait HealthSource: Send + Sync {
    fn name(&self) -> &str;

    async fn component_health(&self) -> ComponentHealth;
}

/// Combined health report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub uptime_secs: u64,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// Aggregates registered [`HealthSource`]s into one report.
pub struct HealthAggregator {
    sources: Vec<Arc<dyn HealthSource>>,
    started_at: Instant,
}

impl HealthAggregator {
    pub fn new() -> Self {
        Self { sources: Vec::new(), started_at: Instant::now() }
    }

    pub fn register(&mut self, source: Arc<dyn HealthSource>) {
        self.sources.push(source);
    }

    /// Query every source concurrently and roll the statuses up: `error`
    /// beats `degraded`/`initializing`, which beat `ok`.
    pub async fn build_health_report(&self) -> HealthReport {
        let checks = self.sources.iter().map(|source| async move {
            (source.name().to_string(), source.component_health().await)
        });
        let components: BTreeMap<String, ComponentHealth> =
            futures::future::join_all(checks).await.into_iter().collect();

        let status = overall_status(components.values());
        let report = HealthReport {
            status,
            timestamp: chrono::Utc::now(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            components,
        };

        match status {
            HealthStatus::Error => {
                error!(status = status.as_str(), "Health check reported errors")
            }
            HealthStatus::Degraded | HealthStatus::Initializing => {
                warn!(status = status.as_str(), "Health check reported degraded components")
            }
            HealthStatus::Ok => debug!(status = status.as_str(), "Health check passed"),
        }

        report
    }
}

impl Default for HealthAggregator {
    fn default() -> Self {
        Self::new()
    }
}

fn overall_status<'a>(components: impl Iterator<Item = &'a ComponentHealth>) -> HealthStatus {
    let mut status = HealthStatus::Ok;
    for component in components {
        match component.status {
            HealthStatus::Error => return HealthStatus::Error,
            HealthStatus::Degraded | HealthStatus::Initializing => {
                status = HealthStatus::Degraded;
            }
            HealthStatus::Ok => {}
        }
    }
    status
}

/// Health source for the persisted config store.
pub struct StoreHealthSource {
    store: Arc<dyn ConfigStore>,
}

impl StoreHealthSource {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HealthSource for StoreHealthSource {
    fn name(&self) -> &str {
        "config_store"
    }

    async fn component_health(&self) -> ComponentHealth {
        let start = Instant::now();
        match self.store.ready().await {
            Ok(()) => ComponentHealth::ok()
                .with_metadata("response_time_ms", start.elapsed().as_millis().to_string()),
            Err(e) => ComponentHealth::error("store_unavailable")
                .with_metadata("detail", e.to_string()),
        }
    }
}
