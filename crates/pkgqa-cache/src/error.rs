use std::path::PathBuf;

use thiserror::Error;

use crate::CacheKind;

#[derive(Debug, Error)]
pub enum CacheError {
    /// Writing a cache file failed.
    #[error("failed dumping {kind} cache: {}: {source}", path.display())]
    Save {
        kind: CacheKind,
        path: PathBuf,
        source: std::io::Error,
    },

    /// Removing a cache file or directory failed.
    #[error("failed removing cache: {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A cache type name outside the registry.
    #[error("unknown cache type: {0}")]
    UnknownKind(String),

    /// A payload could not be serialized.
    #[error("failed encoding {kind} cache: {source}")]
    Encode {
        kind: CacheKind,
        source: serde_json::Error,
    },
}
