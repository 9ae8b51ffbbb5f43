//! # Resilience Primitives
//!
//! Generic retry-with-backoff and circuit breaker used to wrap flaky
//! external calls (secret backends, store readiness). Both are clock-driven
//! through `tokio::time` so tests run them deterministically under a paused
//! runtime clock.

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
pub use retry::{execute_with_retry, RetryConfig};
