use std::path::PathBuf;

use pkgqa_cache::CacheError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AddonError {
    #[error("git error: {0}")]
    Git(String),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("profile error: {0}")]
    Profile(String),
}
