//! Per-dependency facade wiring breaker, retry, and collector together
//!
//! Each external API client owns one `ResilientService` and routes every
//! outbound call through it. The breaker wraps the retry executor, so a full
//! retry burst against a degraded provider counts as a single
//! breaker-observed failure rather than `max_attempts` separate ones; the
//! breaker opens on independent outage signals, not on retry amplification.

use futures::future::BoxFuture;
use std::sync::Arc;

use crate::config::ResilienceConfig;
use crate::error::{Failure, Result};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerStatus};
use super::collector::ErrorCollector;
use super::retry::{RetryExecutor, RetryPolicy};

/// Resilient call path for one external dependency.
pub struct ResilientService {
    name: String,
    breaker: CircuitBreaker,
    retry_policy: RetryPolicy,
    executor: RetryExecutor,
    collector: Arc<ErrorCollector>,
}

impl ResilientService {
    /// Create the call path for `name`, sharing the process-wide collector.
    pub fn new(
        name: impl Into<String>,
        config: ResilienceConfig,
        collector: Arc<ErrorCollector>,
    ) -> Self {
        let name = name.into();
        Self {
            breaker: CircuitBreaker::new(name.clone(), config.circuit_breaker),
            executor: RetryExecutor::new(name.clone()).with_collector(Arc::clone(&collector)),
            retry_policy: config.retry,
            collector,
            name,
        }
    }

    /// Execute an operation with retry inside the circuit breaker.
    ///
    /// Returns either the operation's value or the last [`ClassifiedError`]
    /// observed: a breaker rejection (with `details.state` set), a terminal
    /// failure, or the final transient failure after retries ran out.
    ///
    /// [`ClassifiedError`]: crate::error::ClassifiedError
    pub async fn call<T, F>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> BoxFuture<'static, std::result::Result<T, Failure>>,
    {
        let executor = &self.executor;
        let policy = &self.retry_policy;
        let result = self
            .breaker
            .execute(|| executor.with_retry(policy, operation))
            .await;

        if let Err(error) = &result {
            // retry already records its own final failures; breaker
            // rejections are recognizable by their state marker
            if error.details.state.is_some() {
                self.collector.add(error.clone());
            }
        }
        result
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the underlying breaker for observability.
    pub async fn breaker_status(&self) -> CircuitBreakerStatus {
        self.breaker.status().await
    }

    /// The shared error history this service records into.
    pub fn collector(&self) -> &Arc<ErrorCollector> {
        &self.collector
    }
}
