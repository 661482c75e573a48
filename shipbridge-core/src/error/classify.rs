//! Failure classification for external API calls
//!
//! Maps whatever an HTTP client surfaces on failure (a non-2xx response, a
//! transport error, a stray message) into exactly one [`ClassifiedError`].
//! Classification is a total function with no side effects: it never fails
//! and is safe to call from any number of concurrent tasks.

use http::{HeaderMap, StatusCode};

use super::types::{ClassifiedError, ErrorKind};

/// A raw failure observed while calling an external API, before
/// classification.
#[derive(Debug)]
pub enum Failure {
    /// A failure that has already been through the classifier
    Classified(ClassifiedError),
    /// A non-2xx HTTP response
    Http {
        status: StatusCode,
        /// Seconds parsed from a `retry-after` header, if the response had one
        retry_after: Option<u64>,
        message: String,
    },
    /// A transport-level failure from the HTTP client (DNS, connect, timeout)
    Transport(reqwest::Error),
    /// Anything else a provider SDK surfaced as a plain message
    Other(String),
}

impl Failure {
    /// Build a failure from an HTTP response's status line and headers,
    /// capturing a seconds-form `retry-after` header when present.
    pub fn from_response(status: StatusCode, headers: &HeaderMap) -> Self {
        let retry_after = headers
            .get(http::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        Failure::Http {
            status,
            retry_after,
            message: format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("error")
            ),
        }
    }
}

impl From<ClassifiedError> for Failure {
    fn from(error: ClassifiedError) -> Self {
        Failure::Classified(error)
    }
}

impl From<reqwest::Error> for Failure {
    fn from(error: reqwest::Error) -> Self {
        Failure::Transport(error)
    }
}

impl From<String> for Failure {
    fn from(message: String) -> Self {
        Failure::Other(message)
    }
}

/// Classify a raw failure observed while calling `service`.
///
/// Rules are evaluated in order:
/// 1. already-classified errors pass through unchanged (idempotent);
/// 2. an HTTP status maps through a fixed table, with the original status
///    preserved as the transport status;
/// 3. DNS or connection failures become [`ErrorKind::NetworkError`];
/// 4. elapsed deadlines become [`ErrorKind::Timeout`];
/// 5. everything else becomes [`ErrorKind::ExternalError`] with the original
///    message kept in the details.
pub fn classify(failure: Failure, service: &str) -> ClassifiedError {
    match failure {
        Failure::Classified(error) => error,

        Failure::Http {
            status,
            retry_after,
            message,
        } => {
            let kind = match status.as_u16() {
                400 => ErrorKind::InvalidParams,
                401 => ErrorKind::Unauthorized,
                403 => ErrorKind::Forbidden,
                404 => ErrorKind::NotFound,
                429 => ErrorKind::RateLimited,
                500 | 502 | 503 => ErrorKind::ServiceUnavailable,
                504 => ErrorKind::Timeout,
                _ => ErrorKind::ApiError,
            };
            let mut error = ClassifiedError::new(kind, message)
                .with_service(service)
                .with_status(status.as_u16());
            if kind == ErrorKind::RateLimited {
                error = error.with_retry_after(retry_after.unwrap_or(60));
            }
            error
        }

        Failure::Transport(source) => {
            let message = source.to_string();
            if source.is_connect() {
                ClassifiedError::new(ErrorKind::NetworkError, message).with_service(service)
            } else if source.is_timeout() || mentions_timeout(&message) {
                ClassifiedError::new(ErrorKind::Timeout, message).with_service(service)
            } else {
                ClassifiedError::new(ErrorKind::ExternalError, message.clone())
                    .with_service(service)
                    .with_original_error(message)
            }
        }

        Failure::Other(message) => {
            if mentions_timeout(&message) {
                ClassifiedError::new(ErrorKind::Timeout, message).with_service(service)
            } else {
                ClassifiedError::new(ErrorKind::ExternalError, message.clone())
                    .with_service(service)
                    .with_original_error(message)
            }
        }
    }
}

fn mentions_timeout(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("timeout") || lower.contains("timed out") || lower.contains("deadline")
}
