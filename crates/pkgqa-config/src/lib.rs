//! # pkgqa-config
//!
//! Layered configuration loading for pkgqa using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`PKGQA_*` prefix, `__` as separator)
//! 2. Project-level `.pkgqa/config.toml`
//! 3. User-level `~/.config/pkgqa/config.toml`
//! 4. Built-in defaults
//!
//! Figment maps `PKGQA_SCAN__JOBS` -> `scan.jobs`, `PKGQA_CACHE__DIR` -> `cache.dir`.
//!
//! ```no_run
//! use pkgqa_config::PkgqaConfig;
//!
//! let config = PkgqaConfig::load_with_dotenv().expect("config");
//! println!("cache root: {}", config.cache.dir.display());
//! ```

mod cache;
mod error;
mod git;
mod scan;

pub use cache::CacheConfig;
pub use error::ConfigError;
pub use git::GitConfig;
pub use scan::{ScanConfig, VersionFilter};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PkgqaConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub git: GitConfig,
}

impl PkgqaConfig {
    /// Load configuration from TOML files and environment variables.
    ///
    /// Does NOT call `dotenvy`; use [`PkgqaConfig::load_with_dotenv`] for `.env` support.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(&Self::figment())
    }

    /// Load configuration after reading a `.env` file from the working tree.
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load()
    }

    /// Extract and validate from an arbitrary figment.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.scan.validate()?;
        Ok(config)
    }

    /// Build the figment provider chain.
    ///
    /// Public so tests can inspect the figment or layer more providers on top.
    #[must_use]
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        let local_path = PathBuf::from(".pkgqa/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        figment.merge(Env::prefixed("PKGQA_").split("__"))
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("pkgqa").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_loads() {
        let config = PkgqaConfig::default();
        assert_eq!(config.scan.jobs, None);
        assert!(config.scan.serial_package_scope);
        assert_eq!(config.git.upstream_ref, "origin/HEAD");
        assert_eq!(config.git.local_ref, "master");
    }

    #[test]
    fn figment_builds_without_files() {
        figment::Jail::expect_with(|_jail| {
            let config = PkgqaConfig::load().map_err(|e| e.to_string())?;
            assert!(config.cache.git);
            assert_eq!(config.scan.filter, None);
            Ok(())
        });
    }
}
