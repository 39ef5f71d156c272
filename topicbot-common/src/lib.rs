//! Topicbot Common - shared configuration, errors and logging for the dialogue engine.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup
//! - Small text utilities

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    CacheBackendKind, CacheConfig, Config, ObservabilityConfig, PacingConfig, RedisCacheConfig,
    ResponsesConfig, SessionConfig, TopicsConfig,
};
pub use error::{Error, Result, ResultExt};
pub use logging::LogFormat;
pub use validation::{Validate, ValidationError, ValidationResult};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result, ResultExt};
    pub use crate::logging::init_logging;
    pub use crate::validation::{Validate, ValidationError};
}
