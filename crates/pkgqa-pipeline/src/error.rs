use pkgqa_core::{MetadataError, Scope};
use thiserror::Error;

/// Failure raised by a check hook.
///
/// Only [`CheckError::Metadata`] is recoverable: runners turn it into a
/// finding. Anything else aborts the scan.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("check {check} has {check_scope} scope but its source has {source_scope} scope")]
    ScopeMismatch {
        check: String,
        check_scope: Scope,
        source_scope: Scope,
    },

    #[error("invalid runner state: cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },

    #[error("check {check} failed: {message}")]
    Check { check: String, message: String },

    #[error("worker panicked: {0}")]
    WorkerPanic(String),

    #[error("failed starting worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("results channel closed")]
    ResultsClosed,

    #[error("results stream ended without an end marker")]
    Truncated,
}
