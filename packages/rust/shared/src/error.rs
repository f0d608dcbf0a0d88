//! Error types for ExamForge.
//!
//! Library crates use [`ExamForgeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all ExamForge operations.
#[derive(Debug, thiserror::Error)]
pub enum ExamForgeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Content store read or write failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Generative backend failure outside the cascade (e.g. client setup).
    #[error("backend error: {0}")]
    Backend(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Inbound request or data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Neither the cache nor any backend produced a single question.
    #[error("no questions are available for this request right now")]
    ContentUnavailable,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ExamForgeError>;

impl ExamForgeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
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
