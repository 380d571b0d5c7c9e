//! Error types for the catalog enricher.
//!
//! Library crates use [`EnricherError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all enricher operations.
#[derive(Debug, thiserror::Error)]
pub enum EnricherError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to the generation service.
    #[error("network error: {0}")]
    Network(String),

    /// Input artifact or response decoding error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Generation service returned something unusable.
    #[error("generation error: {0}")]
    Generation(String),

    /// Checkpoint snapshot could not be encoded or persisted.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (invariant violation, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, EnricherError>;

impl EnricherError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = EnricherError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = EnricherError::validation("processed_ids has 3 entries, enriched_products has 2");
        assert!(err.to_string().contains("processed_ids has 3"));
    }

    #[test]
    fn io_error_carries_path() {
        let err = EnricherError::io(
            "/tmp/checkpoint.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let msg = err.to_string();
        assert!(msg.contains("checkpoint.json"));
        assert!(msg.contains("gone"));
    }
}
