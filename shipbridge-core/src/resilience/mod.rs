//! Resilience machinery for outbound API calls
//!
//! The call path for every outbound request is: circuit breaker admits the
//! call, the retry executor drives attempts against the raw operation, and
//! final failures land in the shared error collector before propagating.

pub mod circuit_breaker;
pub mod collector;
pub mod retry;
pub mod service;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStatus, CircuitState,
};
pub use collector::{ErrorCollector, ErrorSummary, DEFAULT_MAX_ERRORS};
pub use retry::{RetryExecutor, RetryPolicy};
pub use service::ResilientService;
