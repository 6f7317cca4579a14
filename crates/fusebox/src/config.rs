//! Circuit breaker configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors from validating a [`CircuitBreakerConfig`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failure_threshold must be at least 1")]
    ZeroFailureThreshold,

    #[error("half_open_trial_limit must be at least 1")]
    ZeroTrialLimit,

    #[error("cooldown must be greater than zero")]
    ZeroCooldown,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures tolerated while closed
    pub failure_threshold: u32,

    /// Consecutive failures tolerated while half-open
    pub half_open_trial_limit: u32,

    /// Time spent open before probing recovery (e.g. "1s", "250ms")
    #[serde(with = "duration_human")]
    pub cooldown: Duration,
}

mod duration_human {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(de::Error::custom)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            half_open_trial_limit: 2,
            cooldown: Duration::from_secs(1),
        }
    }
}

impl CircuitBreakerConfig {
    /// Check that every limit is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        if self.half_open_trial_limit == 0 {
            return Err(ConfigError::ZeroTrialLimit);
        }
        if self.cooldown.is_zero() {
            return Err(ConfigError::ZeroCooldown);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.half_open_trial_limit, 2);
        assert_eq!(config.cooldown, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_limits() {
        let config = CircuitBreakerConfig {
            failure_threshold: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroFailureThreshold));

        let config = CircuitBreakerConfig {
            half_open_trial_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTrialLimit));

        let config = CircuitBreakerConfig {
            cooldown: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroCooldown));
    }

    #[test]
    fn test_human_readable_cooldown() {
        let config: CircuitBreakerConfig = serde_json::from_str(
            r#"{"failure_threshold": 5, "cooldown": "1m 30s"}"#,
        )
        .unwrap();

        assert_eq!(config.failure_threshold, 5);
        // Missing fields fall back to defaults
        assert_eq!(config.half_open_trial_limit, 2);
        assert_eq!(config.cooldown, Duration::from_secs(90));

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["cooldown"], "1m 30s");
    }

    #[test]
    fn test_invalid_cooldown_string() {
        let result: Result<CircuitBreakerConfig, _> =
            serde_json::from_str(r#"{"cooldown": "soon"}"#);
        assert!(result.is_err());
    }
}
