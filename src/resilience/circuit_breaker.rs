//! Circuit breaker for flaky external calls.
//!
//! States: `closed → open → half-open → closed | open`. While open, calls
//! are rejected without invoking the wrapped operation until the cooldown
//! window elapses; the half-open state then admits a bounded number of
//! trial calls.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::observability::MetricsRecorder;

/// Thresholds and windows for one [`CircuitBreaker`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in `closed` state before the breaker opens.
    pub failure_threshold: u32,
    /// How long the breaker stays open before allowing trial calls.
    pub cooldown: Duration,
    /// Maximum concurrent/total trial calls admitted while half-open.
    pub half_open_max_calls: u32,
    /// Successful trial calls required to close the breaker again.
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            half_open_max_calls: 1,
            half_open_success_threshold: 1,
        }
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// Error returned by [`CircuitBreaker::call`].
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// The breaker rejected the call without invoking the operation.
    #[error("circuit breaker '{name}' is open, retry at {retry_at:?}")]
    Open { name: String, retry_at: Instant },

    /// The wrapped operation ran and failed.
    #[error("{0}")]
    Operation(E),
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    half_open_calls: u32,
    half_open_successes: u32,
    next_attempt_at: Option<Instant>,
}

/// Shared-state circuit breaker; clone freely, all clones share one state.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    metrics: MetricsRecorder,
    inner: Arc<Mutex<BreakerInner>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            metrics: MetricsRecorder::new(),
            inner: Arc::new(Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                half_open_calls: 0,
                half_open_successes: 0,
                next_attempt_at: None,
            })),
        }
    }

    /// Run `operation` through the breaker.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.admit().await?;

        match operation().await {
            Ok(value) => {
                self.record_success().await;
                Ok(value)
            }
            Err(error) => {
                self.record_failure(&error).await;
                Err(CircuitBreakerError::Operation(error))
            }
        }
    }

    /// Current state, for diagnostics and tests.
    pub async fn state(&self) -> BreakerState {
        self.inner.lock().await.state
    }

    /// Accumulated consecutive failure count.
    pub async fn failure_count(&self) -> u32 {
        self.inner.lock().await.failure_count
    }

    async fn admit<E>(&self) -> Result<(), CircuitBreakerError<E>> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();

        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let retry_at = inner.next_attempt_at.unwrap_or(now);
                if now < retry_at {
                    return Err(CircuitBreakerError::Open { name: self.name.clone(), retry_at });
                }
                info!(breaker = %self.name, "Circuit breaker half-open, admitting trial calls");
                self.metrics.record_breaker_transition(&self.name, BreakerState::HalfOpen.as_str());
                inner.state = BreakerState::HalfOpen;
                inner.half_open_calls = 1;
                inner.half_open_successes = 0;
                Ok(())
            }
            BreakerState::HalfOpen => {
                if inner.half_open_calls >= self.config.half_open_max_calls {
                    let retry_at = inner.next_attempt_at.unwrap_or(now);
                    return Err(CircuitBreakerError::Open { name: self.name.clone(), retry_at });
                }
                inner.half_open_calls += 1;
                Ok(())
            }
        }
    }

    async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            BreakerState::Closed => {
                inner.failure_count = 0;
            }
            BreakerState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.half_open_success_threshold {
                    info!(breaker = %self.name, "Circuit breaker closed");
                    self.metrics
                        .record_breaker_transition(&self.name, BreakerState::Closed.as_str());
                    inner.state = BreakerState::Closed;
                    inner.failure_count = 0;
                    inner.half_open_calls = 0;
                    inner.half_open_successes = 0;
                    inner.next_attempt_at = None;
                }
            }
            // A success racing an open transition has no counters to update.
            BreakerState::Open => {}
        }
    }

    async fn record_failure(&self, error: &dyn std::fmt::Display) {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();

        match inner.state {
            BreakerState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    self.open(&mut inner, now, error);
                }
            }
            BreakerState::HalfOpen => {
                // Trial failure reopens immediately; the failure count keeps
                // accumulating across the reopen.
                inner.failure_count += 1;
                self.open(&mut inner, now, error);
            }
            BreakerState::Open => {}
        }
    }

    fn open(&self, inner: &mut BreakerInner, now: Instant, error: &dyn std::fmt::Display) {
        let retry_at = now + self.config.cooldown;
        warn!(
            breaker = %self.name,
            failure_count = inner.failure_count,
            retry_at = ?retry_at,
            error = %error,
            "Circuit breaker opened"
        );
        self.metrics.record_breaker_transition(&self.name, BreakerState::Open.as_str());
        inner.state = BreakerState::Open;
        inner.next_attempt_at = Some(retry_at);
        inner.half_open_calls = 0;
        inner.half_open_successes = 0;
    }
}
