//! Cache configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const fn enabled() -> bool {
    true
}

fn default_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("pkgqa")
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Root directory holding per-repository cache files.
    #[serde(default = "default_dir")]
    pub dir: PathBuf,

    #[serde(default = "enabled")]
    pub profiles: bool,

    #[serde(default = "enabled")]
    pub eclass: bool,

    #[serde(default = "enabled")]
    pub git: bool,

    /// Ignore existing caches and regenerate on update.
    #[serde(default)]
    pub force: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            profiles: true,
            eclass: true,
            git: true,
            force: false,
        }
    }
}
