//! Resilient-call layer for the Shipbridge integration service
//!
//! Shipbridge exposes two third-party shipping/commerce REST APIs (a
//! shipping-rate/label provider and an inventory/order provider) as callable
//! operations. This crate is the one piece of that service with a durable
//! engineering contract: every outbound HTTP call goes through failure
//! classification, a per-dependency circuit breaker, and bounded retry with
//! backoff, and final failures are kept in a rolling history for
//! diagnostics.
//!
//! The pieces compose as breaker-wraps-retry:
//!
//! ```text
//! caller -> CircuitBreaker::execute -> RetryExecutor::with_retry -> raw call
//!                                            |  on failure
//!                                            v
//!                                     classify() -> retry or propagate
//!                                            |  on final failure
//!                                            v
//!                                      ErrorCollector
//! ```
//!
//! API clients hold one [`ResilientService`] per external dependency and a
//! process-wide [`ErrorCollector`] shared between them. Every error leaving
//! this layer is a [`ClassifiedError`]; callers never see a raw transport
//! exception.

pub mod config;
pub mod error;
pub mod resilience;

pub use config::ResilienceConfig;
pub use error::{classify, ClassifiedError, ErrorDetails, ErrorKind, Failure, Result};
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStatus, CircuitState, ErrorCollector,
    ErrorSummary, ResilientService, RetryExecutor, RetryPolicy,
};
