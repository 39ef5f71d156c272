//! Error types for the topicbot engine.

use thiserror::Error;

use crate::validation::ValidationError;

/// Result type alias using the topicbot error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the dialogue engine.
///
/// A cache miss is never an error: backends report it as `Ok(None)`.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed inbound message, rejected before any state change
    #[error("Invalid message: {0}")]
    Validation(String),

    /// Startup configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A single plugin file could not be loaded
    #[error("Plugin load error in {path}: {reason}")]
    PluginLoad { path: String, reason: String },

    /// NLU or business handler failure
    #[error("Collaborator failure: {0}")]
    Collaborator(String),

    /// A raw output named a protocol no renderer is registered for
    #[error("No renderer registered for protocol {0}")]
    UnknownProtocol(i32),

    /// Cache backend transport error
    #[error("Cache error: {0}")]
    Cache(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a plugin load error.
    pub fn plugin_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PluginLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Strip any `WithContext` wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this is a message validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self.root(), Self::Validation(_))
    }

    /// Check if this is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self.root(), Self::Config(_))
    }

    /// Check if this is a plugin load error.
    pub fn is_plugin_load(&self) -> bool {
        matches!(self.root(), Self::PluginLoad { .. })
    }

    /// Check if this is a collaborator failure.
    pub fn is_collaborator(&self) -> bool {
        matches!(self.root(), Self::Collaborator(_))
    }

    /// Whether the error aborts only the current turn, leaving the process healthy.
    pub fn is_turn_scoped(&self) -> bool {
        matches!(
            self.root(),
            Self::Validation(_) | Self::Collaborator(_) | Self::UnknownProtocol(_) | Self::Cache(_)
        )
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Extension trait for adding context to any error type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_predicates() {
        assert!(Error::Validation("no user".into()).is_validation());
        assert!(Error::Config("no default topic".into()).is_config());
        assert!(Error::plugin_load("a.json", "bad json").is_plugin_load());
        assert!(Error::Collaborator("ner down".into()).is_collaborator());
    }

    #[test]
    fn test_error_with_context_keeps_category() {
        let err = Error::Collaborator("timeout".into()).with_context("parsing turn");
        assert!(matches!(err, Error::WithContext { .. }));
        assert!(err.is_collaborator());
        assert!(err.is_turn_scoped());
        assert_eq!(err.to_string(), "parsing turn: Collaborator failure: timeout");
    }

    #[test]
    fn test_config_errors_are_not_turn_scoped() {
        assert!(!Error::Config("x".into()).is_turn_scoped());
        assert!(!Error::plugin_load("p", "r").is_turn_scoped());
        assert!(Error::UnknownProtocol(9).is_turn_scoped());
    }

    #[test]
    fn test_result_ext_context() {
        let res: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let err = res.context("reading plugin dir").unwrap_err();
        assert!(err.to_string().starts_with("reading plugin dir"));
        assert!(matches!(err.root(), Error::Io(_)));
    }
}
