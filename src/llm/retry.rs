// ============================================
// MENULENS - Resilient Transport
// Timeout, retry and exponential backoff around one vendor call
// ============================================

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use crate::error::{AnalysisError, AnalysisResult};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts per call (0 behaves like 1)
    pub max_retries: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Per-attempt timeout
    pub timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, timeout: Duration) -> Self {
        Self {
            max_retries,
            timeout,
            ..Default::default()
        }
    }

    /// Config for connection tests: one quick attempt.
    pub fn probe(timeout: Duration) -> Self {
        Self {
            max_retries: 1,
            timeout,
            ..Default::default()
        }
    }

    /// Delay after the given failed attempt (1-based):
    /// `min(initial * multiplier^(attempt-1), max)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay_ms =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// Error classification for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    NoRetry,
}

pub fn retry_decision(error: &AnalysisError) -> RetryDecision {
    if error.is_retryable() {
        RetryDecision::Retry
    } else {
        RetryDecision::NoRetry
    }
}

/// Wraps one network call with timeout, retry and backoff.
#[derive(Debug, Clone, Default)]
pub struct ResilientTransport {
    config: RetryConfig,
}

impl ResilientTransport {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out.
    /// Attempts are strictly sequential.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> AnalysisResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AnalysisResult<T>>,
    {
        let attempts = self.config.attempts();
        let mut last_error = None;

        for attempt in 1..=attempts {
            let outcome = match timeout(self.config.timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(AnalysisError::Timeout {
                    timeout_ms: self.config.timeout.as_millis() as u64,
                }),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!("Call succeeded on attempt {}", attempt);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if retry_decision(&e) == RetryDecision::NoRetry {
                        tracing::error!("Permanent error ({:?}), not retrying: {}", e.code(), e);
                        return Err(e);
                    }

                    if attempt < attempts {
                        let delay = self.config.delay_for_attempt(attempt);
                        tracing::warn!(
                            "Attempt {}/{} failed: {}. Retrying in {:?}...",
                            attempt,
                            attempts,
                            e,
                            delay
                        );
                        sleep(delay).await;
                    } else {
                        tracing::error!("All {} attempts failed: {}", attempts, e);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| AnalysisError::Transport("retry loop made no attempt".to_string())))
    }
}
