//! Cross-cutting error types for pkgqa.
//!
//! Component errors (`CacheError`, `PipelineError`, ...) are defined in their
//! respective crates and converge as `anyhow::Error` in `pkgqa-cli`.

use thiserror::Error;

/// Errors that can be raised while building core values.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A scope name did not match any known scope.
    #[error("unknown scope: {0}")]
    UnknownScope(String),

    /// A package identity string was malformed.
    #[error("invalid package key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// A severity name did not match any known severity.
    #[error("unknown severity: {0}")]
    UnknownSeverity(String),
}
