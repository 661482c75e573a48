//! Resilience configuration
//!
//! One [`ResilienceConfig`] per protected dependency, typically loaded from
//! the service's TOML configuration. Every field has a default, so a config
//! file only needs to name what it overrides.

use serde::{Deserialize, Serialize};

use crate::resilience::{CircuitBreakerConfig, RetryPolicy, DEFAULT_MAX_ERRORS};

/// Tuning for one dependency's resilient call path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Retry behavior for transient failures
    pub retry: RetryPolicy,
    /// Circuit breaker admission control
    pub circuit_breaker: CircuitBreakerConfig,
    /// Capacity of the rolling error history
    pub max_collected_errors: usize,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            max_collected_errors: DEFAULT_MAX_ERRORS,
        }
    }
}

impl ResilienceConfig {
    /// Parse from a TOML fragment; missing fields fall back to defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn defaults_match_the_documented_policy() {
        let config = ResilienceConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(1000));
        assert_eq!(config.retry.max_delay, Duration::from_millis(30_000));
        assert!(config.retry.exponential_backoff);
        assert!(config.retry.jitter);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.open_duration, Duration::from_secs(30));
        assert_eq!(config.max_collected_errors, 100);
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let config = ResilienceConfig::from_toml_str(
            r#"
            max_collected_errors = 50

            [retry]
            max_attempts = 5
            base_delay = "250ms"

            [circuit_breaker]
            failure_threshold = 2
            open_duration = "10s"
            "#,
        )
        .expect("valid config");

        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(250));
        // untouched fields keep their defaults
        assert_eq!(config.retry.max_delay, Duration::from_millis(30_000));
        assert!(config.retry.jitter);
        assert_eq!(config.circuit_breaker.failure_threshold, 2);
        assert_eq!(config.circuit_breaker.open_duration, Duration::from_secs(10));
        assert_eq!(config.circuit_breaker.probe_cooldown, Duration::from_secs(30));
        assert_eq!(config.max_collected_errors, 50);
    }

    #[test]
    fn empty_toml_is_all_defaults() {
        let config = ResilienceConfig::from_toml_str("").expect("valid config");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.max_collected_errors, 100);
    }
}
