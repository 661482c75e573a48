//! Bounded retry with backoff and jitter for transient failures
//!
//! Wraps an asynchronous operation with a bounded number of attempts. Each
//! failure is classified, terminal kinds propagate immediately, and
//! transient kinds wait out an exponential backoff (with jitter to avoid
//! synchronized retry storms) before the next attempt. The final failure of
//! a call is recorded in the error collector before it propagates.

use futures::future::BoxFuture;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{classify, ClassifiedError, Failure, Result};

use super::collector::ErrorCollector;

/// Retry behavior for one call. Immutable; pass per call or use the default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Upper bound on any single computed delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Double the delay after each failed attempt
    pub exponential_backoff: bool,
    /// Scale each computed delay by a uniform factor in [0.5, 1.0]
    pub jitter: bool,
    /// Total retry budget measured from the first attempt; a sleep that
    /// would overrun it is skipped and the last error propagates instead
    #[serde(default, with = "humantime_serde")]
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            exponential_backoff: true,
            jitter: true,
            deadline: None,
        }
    }
}

impl RetryPolicy {
    /// Fixed-delay policy without backoff or jitter.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            exponential_backoff: false,
            jitter: false,
            ..Default::default()
        }
    }

    /// Exponential-backoff policy with the default delays.
    pub fn exponential(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Set the total retry budget.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Delay before the attempt following failed attempt number `attempt`
    /// (1-based), before jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if !self.exponential_backoff {
            return self.base_delay;
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

fn apply_jitter(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.5..=1.0);
    Duration::from_millis((delay.as_millis() as f64 * factor) as u64)
}

/// Retry executor for one external service.
///
/// Carries the service name so failures are classified against the right
/// dependency, and optionally a shared [`ErrorCollector`] into which the
/// final failure of every exhausted or terminal call is recorded.
#[derive(Clone)]
pub struct RetryExecutor {
    service: String,
    collector: Option<Arc<ErrorCollector>>,
}

impl RetryExecutor {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            collector: None,
        }
    }

    /// Record final failures into `collector`.
    pub fn with_collector(mut self, collector: Arc<ErrorCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Attempt `operation` up to `policy.max_attempts` times.
    ///
    /// The operation must surface failures as `Err` (never a sentinel value)
    /// and must not retry internally; retry is this layer's exclusive
    /// responsibility. Suspension between attempts yields to the runtime, it
    /// never blocks a worker thread.
    pub async fn with_retry<T, F>(&self, policy: &RetryPolicy, mut operation: F) -> Result<T>
    where
        F: FnMut() -> BoxFuture<'static, std::result::Result<T, Failure>>,
    {
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(
                            service = %self.service,
                            attempts = attempt,
                            "operation succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(failure) => {
                    let error = classify(failure, &self.service);

                    if attempt >= policy.max_attempts {
                        warn!(
                            service = %self.service,
                            attempts = attempt,
                            error = %error,
                            "retry attempts exhausted"
                        );
                        return Err(self.record(error));
                    }
                    if !error.is_retryable() {
                        debug!(
                            service = %self.service,
                            error = %error,
                            "error is not retryable"
                        );
                        return Err(self.record(error));
                    }

                    let hint = error.retry_delay_hint();
                    let mut delay = hint.unwrap_or_else(|| policy.delay_for_attempt(attempt));
                    if policy.jitter && hint.is_none() {
                        delay = apply_jitter(delay);
                    }

                    if let Some(deadline) = policy.deadline {
                        if started.elapsed().saturating_add(delay) > deadline {
                            warn!(
                                service = %self.service,
                                attempts = attempt,
                                error = %error,
                                "retry deadline reached, giving up"
                            );
                            return Err(self.record(error));
                        }
                    }

                    warn!(
                        service = %self.service,
                        attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying after transient failure"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    fn record(&self, error: ClassifiedError) -> ClassifiedError {
        if let Some(collector) = &self.collector {
            collector.add(error.clone());
        }
        error
    }
}
