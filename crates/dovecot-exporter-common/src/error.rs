//! Error types for the quota exporter
//!
//! Provides a unified error type and the per-key rejection variants

use thiserror::Error;

/// Result type alias using ExporterError
pub type Result<T> = std::result::Result<T, ExporterError>;

/// Unified error type for exporter operations
#[derive(Debug, Error)]
pub enum ExporterError {
    // Quota key errors (one key rejected, the cycle continues)
    #[error("Quota key error: {0}")]
    Key(#[from] KeyError),

    // Value errors (one key skipped, the cycle continues)
    #[error("Value error for key {key}: {reason}")]
    ValueParse { key: String, reason: String },

    // Store errors (the whole cycle is aborted)
    #[error("Connection error: {0}")]
    Connection(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Metrics registration and encoding errors
    #[error("Metrics error: {0}")]
    Metrics(String),

    // Listener and socket errors
    #[error("IO error: {0}")]
    Io(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExporterError {
    /// Whether this error only affects a single key
    ///
    /// Per-key errors are logged and skipped; anything else aborts the cycle.
    pub fn is_per_key(&self) -> bool {
        matches!(self, ExporterError::Key(_) | ExporterError::ValueParse { .. })
    }
}

/// Rejections produced while decoding a quota key
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("malformed key (expected <identity>/quota/<kind>): {0}")]
    MalformedKey(String),

    #[error("malformed identity (expected <local-part>@<domain>): {0}")]
    MalformedIdentity(String),

    #[error("unknown component in the key: {0}")]
    UnknownKind(String),
}

impl From<std::io::Error> for ExporterError {
    fn from(err: std::io::Error) -> Self {
        ExporterError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExporterError::Key(KeyError::UnknownKind("a@x.com/quota/weird".to_string()));
        assert!(err.to_string().contains("a@x.com/quota/weird"));
    }

    #[test]
    fn test_per_key_classification() {
        let key_err: ExporterError = KeyError::MalformedKey("bad".into()).into();
        assert!(key_err.is_per_key());

        let value_err = ExporterError::ValueParse {
            key: "a@x.com/quota/storage".into(),
            reason: "invalid float literal".into(),
        };
        assert!(value_err.is_per_key());
        assert!(value_err.to_string().contains("invalid float literal"));

        assert!(!ExporterError::Connection("refused".into()).is_per_key());
    }
}
