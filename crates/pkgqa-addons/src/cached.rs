use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use pkgqa_cache::{CacheError, CacheKind, CacheStore};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// An addon persisting derived data in one registered cache type.
pub trait CachedAddon {
    const KIND: CacheKind;

    fn store(&self) -> &CacheStore;

    fn cache_file(&self, repo_id: &Path) -> PathBuf {
        self.store().cache_file(Self::KIND, repo_id)
    }

    fn load_cache<T: DeserializeOwned>(&self, path: &Path, fallback: T) -> T {
        self.store().load(Self::KIND.spec(), path, fallback)
    }

    fn save_cache<T: Serialize>(&self, data: &T, path: &Path) -> Result<(), CacheError> {
        self.store().save(Self::KIND.spec(), data, path)
    }
}

/// Modification time in nanoseconds since the epoch.
pub(crate) fn mtime_ns(meta: &std::fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
}
