//! Circuit breaker for outbound API calls
//!
//! One breaker guards one external dependency and is shared by every caller
//! of that dependency. It stops issuing calls to a provider that is failing
//! repeatedly and probes recovery after a cooldown:
//!
//! - **Closed**: normal operation, calls pass through
//! - **Open**: failing fast, calls are rejected without reaching the network
//! - **Half-open**: a single probe call is allowed through to test recovery
//!
//! The Open to half-open transition happens lazily on the next call attempt
//! after the cooldown, never on a background timer. A dependency that sees
//! no traffic during its cooldown stays Open until traffic resumes.
//!
//! Callers cancel in-flight attempts with their own timeout mechanism, which
//! drops the admitted future without reporting an outcome. A half-open probe
//! abandoned that way frees its slot once `probe_cooldown` has elapsed since
//! it was admitted, so a cancelled probe can never wedge the breaker.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{ClassifiedError, ErrorKind, Result};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Normal operation - calls pass through
    Closed,
    /// Failing fast - calls are rejected immediately
    Open,
    /// Testing if the dependency has recovered - one probe allowed
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Configuration for circuit breaker behavior, fixed at construction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Cooldown after opening before a recovery probe is admitted
    #[serde(with = "humantime_serde")]
    pub open_duration: Duration,
    /// Cooldown after a failed recovery probe before the next probe; also
    /// how long an abandoned probe holds its half-open slot before a new
    /// probe may be admitted
    #[serde(with = "humantime_serde")]
    pub probe_cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
            probe_cooldown: Duration::from_secs(30),
        }
    }
}

/// Read-only snapshot of a breaker's state and counters
#[derive(Debug, Clone)]
pub struct CircuitBreakerStatus {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    /// Monotonic time of the most recent observed failure
    pub last_failure_at: Option<Instant>,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub rejected_calls: u64,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
    /// When the in-flight half-open probe was admitted; `None` when no
    /// probe holds the slot
    probe_started_at: Option<Instant>,
    /// The last Open transition came from a failed probe, so the next
    /// admission waits `probe_cooldown` instead of `open_duration`
    reopened_by_probe: bool,
}

#[derive(Default)]
struct CallCounters {
    total: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

/// Per-dependency admission control for outbound calls.
///
/// Shared by all callers of one dependency; `Clone` hands out another handle
/// to the same underlying state.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Arc<RwLock<Inner>>,
    counters: Arc<CallCounters>,
}

impl CircuitBreaker {
    /// Create a breaker for the named dependency.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Arc::new(RwLock::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
                opened_at: None,
                probe_started_at: None,
                reopened_by_probe: false,
            })),
            counters: Arc::new(CallCounters::default()),
        }
    }

    /// Execute an operation through the breaker.
    ///
    /// When the circuit is Open (or a half-open probe is already in flight),
    /// the operation is never invoked and the caller gets a
    /// [`ErrorKind::ServiceUnavailable`] error with `details.state`,
    /// `details.failures`, and `details.time_until_reset` set, so it can be
    /// told apart from a live 503.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(rejection) = self.admit().await {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(rejection);
        }

        self.counters.total.fetch_add(1, Ordering::Relaxed);
        let result = operation().await;
        match &result {
            Ok(_) => self.on_success().await,
            Err(error) => self.on_failure(error).await,
        }
        result
    }

    /// Decide whether the next call passes through. Returns the rejection
    /// error if it must not. Performs the lazy Open -> HalfOpen transition.
    async fn admit(&self) -> Option<ClassifiedError> {
        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitState::Closed => None,
            CircuitState::Open => {
                let cooldown = if inner.reopened_by_probe {
                    self.config.probe_cooldown
                } else {
                    self.config.open_duration
                };
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= cooldown {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_started_at = Some(Instant::now());
                    info!(
                        breaker = %self.name,
                        "circuit breaker transitioning to half-open"
                    );
                    None
                } else {
                    Some(self.rejection(&inner, "OPEN", cooldown.saturating_sub(elapsed)))
                }
            }
            CircuitState::HalfOpen => {
                // A cancelled probe never reports an outcome; once it has
                // held the slot for a full probe_cooldown it is treated as
                // abandoned and the slot is handed to the next caller.
                let held = inner.probe_started_at.map(|at| at.elapsed());
                match held {
                    Some(held) if held < self.config.probe_cooldown => Some(self.rejection(
                        &inner,
                        "HALF_OPEN",
                        self.config.probe_cooldown.saturating_sub(held),
                    )),
                    _ => {
                        inner.probe_started_at = Some(Instant::now());
                        None
                    }
                }
            }
        }
    }

    fn rejection(&self, inner: &Inner, state: &str, remaining: Duration) -> ClassifiedError {
        ClassifiedError::new(
            ErrorKind::ServiceUnavailable,
            format!("circuit breaker '{}' is {}", self.name, inner.state),
        )
        .with_service(self.name.clone())
        .with_state(state, inner.consecutive_failures, remaining.as_millis() as u64)
    }

    async fn on_success(&self) {
        self.counters.successful.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.write().await;
        if inner.state != CircuitState::Closed {
            info!(
                breaker = %self.name,
                from = %inner.state,
                "circuit breaker closing after successful call"
            );
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.probe_started_at = None;
        inner.reopened_by_probe = false;
    }

    async fn on_failure(&self, error: &ClassifiedError) {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.write().await;
        inner.consecutive_failures += 1;
        inner.last_failure_at = Some(Instant::now());

        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_started_at = None;
                inner.reopened_by_probe = true;
                warn!(
                    breaker = %self.name,
                    error = %error,
                    "circuit breaker reopening after failed recovery probe"
                );
            }
            CircuitState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    inner.reopened_by_probe = false;
                    warn!(
                        breaker = %self.name,
                        failures = inner.consecutive_failures,
                        "circuit breaker opening after consecutive failures"
                    );
                }
            }
            // A call admitted before the circuit opened finished failing
            // afterwards; the counters above are all that needs updating.
            CircuitState::Open => {}
        }
    }

    /// Name of the dependency this breaker guards.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state of the breaker.
    pub async fn state(&self) -> CircuitState {
        self.inner.read().await.state
    }

    /// Read-only snapshot for observability.
    pub async fn status(&self) -> CircuitBreakerStatus {
        let inner = self.inner.read().await;
        CircuitBreakerStatus {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            failure_threshold: self.config.failure_threshold,
            last_failure_at: inner.last_failure_at,
            total_calls: self.counters.total.load(Ordering::Relaxed),
            successful_calls: self.counters.successful.load(Ordering::Relaxed),
            failed_calls: self.counters.failed.load(Ordering::Relaxed),
            rejected_calls: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    /// Force the breaker open (for tests or operational emergencies).
    pub async fn force_open(&self) {
        let mut inner = self.inner.write().await;
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.reopened_by_probe = false;
        warn!(breaker = %self.name, "circuit breaker forcibly opened");
    }

    /// Force the breaker closed.
    pub async fn force_close(&self) {
        let mut inner = self.inner.write().await;
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.probe_started_at = None;
        inner.reopened_by_probe = false;
        info!(breaker = %self.name, "circuit breaker forcibly closed");
    }
}

impl ClassifiedError {
    /// Attach breaker rejection context. Kept here so the error type itself
    /// stays free of breaker vocabulary.
    fn with_state(mut self, state: &str, failures: u32, time_until_reset_ms: u64) -> Self {
        self.details.state = Some(state.to_string());
        self.details.failures = Some(failures);
        self.details.time_until_reset = Some(time_until_reset_ms);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn failing() -> ClassifiedError {
        ClassifiedError::new(ErrorKind::ServiceUnavailable, "provider down").with_status(503)
    }

    fn breaker(threshold: u32, open: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "test-api",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                open_duration: open,
                probe_cooldown: open,
            },
        )
    }

    #[tokio::test]
    async fn stays_closed_on_successes() {
        let breaker = breaker(3, Duration::from_millis(50));
        for _ in 0..5 {
            let result = breaker.execute(|| async { Ok::<_, ClassifiedError>(42) }).await;
            assert_eq!(result.unwrap(), 42);
            let status = breaker.status().await;
            assert_eq!(status.state, CircuitState::Closed);
            assert_eq!(status.consecutive_failures, 0);
        }
    }

    #[tokio::test]
    async fn opens_after_exactly_threshold_failures() {
        let breaker = breaker(3, Duration::from_millis(50));
        for i in 0..3 {
            let result = breaker.execute(|| async { Err::<(), _>(failing()) }).await;
            assert!(result.is_err());
            if i < 2 {
                assert_eq!(breaker.state().await, CircuitState::Closed);
            }
        }
        assert_eq!(breaker.state().await, CircuitState::Open);
        assert_eq!(breaker.status().await.consecutive_failures, 3);
    }

    #[tokio::test]
    async fn rejects_without_invoking_when_open() {
        let breaker = breaker(2, Duration::from_secs(60));
        for _ in 0..2 {
            let _ = breaker.execute(|| async { Err::<(), _>(failing()) }).await;
        }

        let invoked = std::sync::atomic::AtomicBool::new(false);
        let result = breaker
            .execute(|| {
                invoked.store(true, Ordering::Relaxed);
                async { Ok::<_, ClassifiedError>(42) }
            })
            .await;

        assert!(!invoked.load(Ordering::Relaxed));
        let error = result.unwrap_err();
        assert_eq!(error.kind, ErrorKind::ServiceUnavailable);
        assert_eq!(error.details.state.as_deref(), Some("OPEN"));
        assert_eq!(error.details.failures, Some(2));
        assert!(error.details.time_until_reset.is_some());
        assert_eq!(breaker.status().await.rejected_calls, 1);
    }

    #[tokio::test]
    async fn probes_after_cooldown_and_closes_on_success() {
        let breaker = breaker(2, Duration::from_millis(20));
        for _ in 0..2 {
            let _ = breaker.execute(|| async { Err::<(), _>(failing()) }).await;
        }
        assert_eq!(breaker.state().await, CircuitState::Open);

        sleep(Duration::from_millis(30)).await;

        let result = breaker.execute(|| async { Ok::<_, ClassifiedError>(1) }).await;
        assert!(result.is_ok());
        let status = breaker.status().await;
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn failed_probe_reopens_the_circuit() {
        let breaker = breaker(2, Duration::from_millis(20));
        for _ in 0..2 {
            let _ = breaker.execute(|| async { Err::<(), _>(failing()) }).await;
        }
        sleep(Duration::from_millis(30)).await;

        let result = breaker.execute(|| async { Err::<(), _>(failing()) }).await;
        assert!(result.is_err());
        assert_eq!(breaker.state().await, CircuitState::Open);

        // still inside the fresh cooldown, so the next call is rejected
        let result = breaker.execute(|| async { Ok::<_, ClassifiedError>(1) }).await;
        assert_eq!(
            result.unwrap_err().details.state.as_deref(),
            Some("OPEN")
        );
    }

    #[tokio::test]
    async fn half_open_admits_exactly_one_probe() {
        // probe_cooldown longer than the slow probe so its slot stays held
        let breaker = CircuitBreaker::new(
            "test-api",
            CircuitBreakerConfig {
                failure_threshold: 1,
                open_duration: Duration::from_millis(10),
                probe_cooldown: Duration::from_secs(5),
            },
        );
        let _ = breaker.execute(|| async { Err::<(), _>(failing()) }).await;
        sleep(Duration::from_millis(15)).await;

        let slow_probe = breaker.clone();
        let probe = tokio::spawn(async move {
            slow_probe
                .execute(|| async {
                    sleep(Duration::from_millis(50)).await;
                    Ok::<_, ClassifiedError>(1)
                })
                .await
        });

        // give the probe time to be admitted
        sleep(Duration::from_millis(10)).await;
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);

        let result = breaker.execute(|| async { Ok::<_, ClassifiedError>(2) }).await;
        assert_eq!(
            result.unwrap_err().details.state.as_deref(),
            Some("HALF_OPEN")
        );

        assert_eq!(probe.await.unwrap().unwrap(), 1);
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn cancelled_recovery_call_frees_the_half_open_slot() {
        let breaker = CircuitBreaker::new(
            "test-api",
            CircuitBreakerConfig {
                failure_threshold: 1,
                open_duration: Duration::from_millis(10),
                probe_cooldown: Duration::from_millis(20),
            },
        );
        let _ = breaker.execute(|| async { Err::<(), _>(failing()) }).await;
        sleep(Duration::from_millis(15)).await;

        // caller-side timeout drops the admitted call before it completes,
        // so neither outcome handler ever runs
        let cancelled = tokio::time::timeout(
            Duration::from_millis(5),
            breaker.execute(|| async {
                sleep(Duration::from_millis(200)).await;
                Ok::<_, ClassifiedError>(1)
            }),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);

        // the slot is still held while its cooldown runs
        let result = breaker.execute(|| async { Ok::<_, ClassifiedError>(2) }).await;
        assert_eq!(
            result.unwrap_err().details.state.as_deref(),
            Some("HALF_OPEN")
        );

        // after the cooldown the abandoned slot is handed to a new call,
        // which closes the circuit
        sleep(Duration::from_millis(30)).await;
        let result = breaker.execute(|| async { Ok::<_, ClassifiedError>(3) }).await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn force_open_and_close() {
        let breaker = breaker(5, Duration::from_secs(60));
        breaker.force_open().await;
        assert_eq!(breaker.state().await, CircuitState::Open);
        breaker.force_close().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn status_tracks_call_counters() {
        let breaker = breaker(10, Duration::from_secs(60));
        for _ in 0..3 {
            let _ = breaker.execute(|| async { Ok::<_, ClassifiedError>(()) }).await;
        }
        for _ in 0..2 {
            let _ = breaker.execute(|| async { Err::<(), _>(failing()) }).await;
        }
        let status = breaker.status().await;
        assert_eq!(breaker.name(), "test-api");
        assert_eq!(status.total_calls, 5);
        assert_eq!(status.successful_calls, 3);
        assert_eq!(status.failed_calls, 2);
        assert_eq!(status.rejected_calls, 0);
        assert!(status.last_failure_at.is_some());
    }
}
