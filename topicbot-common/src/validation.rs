//! Configuration validation.
//!
//! Checks that required values are present and within valid ranges before
//! the engine starts.

use thiserror::Error;

use crate::logging::{parse_level, LogFormat};
use crate::config::{
    CacheBackendKind, CacheConfig, Config, ObservabilityConfig, PacingConfig, SessionConfig,
    TopicsConfig,
};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate every section, collecting all failures.
    pub fn validate(&self) -> ValidationResult<()> {
        let sections: [&dyn Validate; 5] = [
            &self.session,
            &self.topics,
            &self.cache,
            &self.pacing,
            &self.observability,
        ];
        collect(sections.iter().filter_map(|s| s.validate().err()).collect())
    }

    /// Load and validate configuration.
    pub fn load_and_validate(path: Option<&std::path::Path>) -> anyhow::Result<Self> {
        let config = Self::load_with_env(path)?;
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
        Ok(config)
    }
}

impl Validate for SessionConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.max_clients == 0 {
            return Err(ValidationError::InvalidValue {
                field: "session.max_clients".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if !self.silence_threshold_secs.is_finite() || self.silence_threshold_secs <= 0.0 {
            return Err(ValidationError::InvalidValue {
                field: "session.silence_threshold_secs".into(),
                reason: "must be a positive number of seconds".into(),
            });
        }

        if !self.silence_threshold_variance.is_finite() || self.silence_threshold_variance < 0.0 {
            return Err(ValidationError::InvalidValue {
                field: "session.silence_threshold_variance".into(),
                reason: "must not be negative".into(),
            });
        }

        if self.initiative_intent.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "session.initiative_intent".into(),
            });
        }

        if self.topic_stack_depth == 0 {
            return Err(ValidationError::InvalidValue {
                field: "session.topic_stack_depth".into(),
                reason: "must keep at least one topic".into(),
            });
        }

        Ok(())
    }
}

impl Validate for TopicsConfig {
    fn validate(&self) -> ValidationResult<()> {
        match self.default_topic.as_deref().map(str::trim) {
            None | Some("") => Err(ValidationError::MissingField {
                field: "topics.default_topic".into(),
            }),
            Some(_) => Ok(()),
        }
    }
}

impl Validate for CacheConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.ttl_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "cache.ttl_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.backend == CacheBackendKind::Redis && !self.redis.url.starts_with("redis") {
            return Err(ValidationError::InvalidValue {
                field: "cache.redis.url".into(),
                reason: format!("expected a redis:// or rediss:// URL, got {}", self.redis.url),
            });
        }

        Ok(())
    }
}

impl Validate for PacingConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !self.jitter_std_ms.is_finite() || self.jitter_std_ms < 0.0 {
            return Err(ValidationError::InvalidValue {
                field: "pacing.jitter_std_ms".into(),
                reason: "must not be negative".into(),
            });
        }

        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        if let Err(reason) = parse_level(&self.log_level) {
            errors.push(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason,
            });
        }
        if let Err(reason) = self.log_format.parse::<LogFormat>() {
            errors.push(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason,
            });
        }
        collect(errors)
    }
}

fn collect(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.topics.default_topic = Some("chitchat".into());
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_missing_default_topic() {
        let config = Config::default();
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ValidationError::MissingField { ref field }) if field == "topics.default_topic"
        ));
    }

    #[test]
    fn test_zero_max_clients() {
        let mut config = valid_config();
        config.session.max_clients = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_settings() {
        let mut config = valid_config();
        config.observability.log_format = "Compact".into();
        assert!(config.validate().is_ok());

        config.observability.log_level = "loud".into();
        match config.validate() {
            Err(ValidationError::InvalidValue { field, .. }) => {
                assert_eq!(field, "observability.log_level")
            }
            other => panic!("expected invalid log level, got {other:?}"),
        }
    }

    #[test]
    fn test_multiple_errors_are_collected() {
        let mut config = Config::default();
        config.cache.ttl_secs = 0;
        config.pacing.jitter_std_ms = -1.0;
        match config.validate() {
            Err(ValidationError::Multiple(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_redis_url_checked_only_for_redis_backend() {
        let mut config = valid_config();
        config.cache.redis.url = "http://nope".into();
        assert!(config.validate().is_ok());

        config.cache.backend = CacheBackendKind::Redis;
        assert!(config.validate().is_err());
    }
}
