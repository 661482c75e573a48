//! Core error types for the resilient-call layer
//!
//! This module contains the canonical `ClassifiedError` type that flows
//! through the retry executor, circuit breaker, and error collector, along
//! with the closed `ErrorKind` taxonomy and its retryability rules.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Closed taxonomy of failure kinds observed when calling external
/// shipping/commerce APIs.
///
/// Every failure that leaves this layer carries exactly one of these kinds,
/// so callers have a single shape to branch on regardless of which provider
/// produced the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Request was malformed or carried invalid parameters (HTTP 400)
    InvalidParams,
    /// Missing or invalid credentials (HTTP 401)
    Unauthorized,
    /// Credentials valid but access denied (HTTP 403)
    Forbidden,
    /// Requested resource does not exist (HTTP 404)
    NotFound,
    /// Provider throttled the request (HTTP 429)
    RateLimited,
    /// Local schema validation rejected the payload before it was sent
    ValidationError,
    /// Operation name did not resolve to a registered handler
    MethodNotFound,
    /// Internal fault in this layer itself
    InternalError,
    /// Provider is degraded or down (HTTP 500/502/503), or the breaker is open
    ServiceUnavailable,
    /// Deadline elapsed before the provider responded
    Timeout,
    /// Provider returned an unexpected non-2xx response
    ApiError,
    /// DNS resolution or connection establishment failed
    NetworkError,
    /// Unrecognized failure surfaced by a provider SDK or transport
    ExternalError,
}

impl ErrorKind {
    /// Stable wire name, used in logs and diagnostics output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidParams => "INVALID_PARAMS",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::MethodNotFound => "METHOD_NOT_FOUND",
            ErrorKind::InternalError => "INTERNAL_ERROR",
            ErrorKind::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::ApiError => "API_ERROR",
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::ExternalError => "EXTERNAL_ERROR",
        }
    }

    /// Default transport status used when a `ClassifiedError` is constructed
    /// without an explicit status. An explicit status always wins.
    pub fn default_status(&self) -> u16 {
        match self {
            ErrorKind::InvalidParams => 400,
            ErrorKind::ValidationError => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::MethodNotFound => 404,
            ErrorKind::RateLimited => 429,
            ErrorKind::InternalError => 500,
            ErrorKind::ExternalError => 500,
            ErrorKind::ApiError => 502,
            ErrorKind::ServiceUnavailable => 503,
            ErrorKind::NetworkError => 503,
            ErrorKind::Timeout => 504,
        }
    }

    /// Whether re-attempting the same operation is considered likely to
    /// succeed. Exactly the transient kinds are retryable; everything else
    /// is terminal and must propagate on first occurrence.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout
                | ErrorKind::ServiceUnavailable
                | ErrorKind::RateLimited
                | ErrorKind::NetworkError
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured diagnostic context attached to a `ClassifiedError`.
///
/// Carries the union of fields the integration layer actually records:
/// which service failed, the observed HTTP status, throttling hints, and
/// circuit breaker state at rejection time. Never used for control flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorDetails {
    /// Name of the external service the call targeted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// HTTP status observed on the wire, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Endpoint or operation the failure occurred on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Seconds the provider asked us to wait (from a `retry-after` header)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    /// Circuit breaker phase when the call was rejected ("OPEN"/"HALF_OPEN")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Consecutive failure count observed by the rejecting breaker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failures: Option<u32>,
    /// Milliseconds until the rejecting breaker will probe again
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_until_reset: Option<u64>,
    /// Message of the raw failure this error was classified from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_error: Option<String>,
    /// When the failure was classified
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Canonical error produced by the classifier and propagated by every
/// operation in this layer.
///
/// Constructed once at the point a failure is classified and immutable
/// afterwards. The transport status is resolved at construction time, so it
/// is always deterministic: an explicit status set via [`with_status`]
/// overrides the per-kind default table.
///
/// [`with_status`]: ClassifiedError::with_status
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    /// Taxonomy kind this failure was classified as
    pub kind: ErrorKind,
    /// Human-readable description
    pub message: String,
    /// Structured diagnostic context
    pub details: ErrorDetails,
    /// HTTP-style status code, explicit or derived from `kind`
    pub transport_status: u16,
}

impl ClassifiedError {
    /// Create a classified error with the kind's default transport status
    /// and a classification timestamp of now.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            transport_status: kind.default_status(),
            details: ErrorDetails {
                timestamp: Some(Utc::now()),
                ..Default::default()
            },
        }
    }

    /// Override the transport status (wins over the default table) and
    /// record the observed status in the details.
    pub fn with_status(mut self, status: u16) -> Self {
        self.transport_status = status;
        self.details.status = Some(status);
        self
    }

    /// Record the external service this failure came from.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.details.service = Some(service.into());
        self
    }

    /// Record the endpoint or operation that failed.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.details.endpoint = Some(endpoint.into());
        self
    }

    /// Record a provider throttling hint, in seconds.
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.details.retry_after = Some(seconds);
        self
    }

    /// Preserve the message of the raw failure this error was derived from.
    pub fn with_original_error(mut self, original: impl Into<String>) -> Self {
        self.details.original_error = Some(original.into());
        self
    }

    /// Whether the retry executor may re-attempt after this error.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Provider-driven delay before the next attempt, when one applies.
    ///
    /// Rate-limited failures use the captured `retry-after` (60s when the
    /// provider sent none); unavailable services get a fixed 30s grace.
    /// Other kinds defer to the caller's backoff policy.
    pub fn retry_delay_hint(&self) -> Option<Duration> {
        match self.kind {
            ErrorKind::RateLimited => {
                Some(Duration::from_secs(self.details.retry_after.unwrap_or(60)))
            }
            ErrorKind::ServiceUnavailable => Some(Duration::from_secs(30)),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClassifiedError>;
