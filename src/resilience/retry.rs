//! Retry executor with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// Backoff parameters for [`execute_with_retry`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound for any computed delay.
    pub max_delay: Duration,
    /// Fraction of the current delay added as random jitter (0.0 disables).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.2,
        }
    }
}

/// Run `operation` until it succeeds or `max_attempts` is exhausted.
///
/// The delay doubles after each failed attempt (capped at `max_delay`) and
/// gets a random jitter of up to `jitter_factor * current_delay` added. The
/// last error is returned unmodified — callers keep their own error type.
pub async fn execute_with_retry<T, E, F, Fut>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut current_delay = config.initial_delay;

    for attempt in 1..=max_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt == max_attempts {
                    return Err(error);
                }

                let delay = next_delay(current_delay, config);
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                current_delay = (current_delay * 2).min(config.max_delay);
            }
        }
    }

    unreachable!("loop either returns a value or the last error")
}

fn next_delay(current_delay: Duration, config: &RetryConfig) -> Duration {
    let jitter = if config.jitter_factor > 0.0 {
        let span = current_delay.as_secs_f64() * config.jitter_factor;
        Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..=span.max(f64::EPSILON)))
    } else {
        Duration::ZERO
    };
    (current_delay + jitter).min(config.max_delay)
}
