//! Scan scheduling configuration.

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Version filter applied to repository sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionFilter {
    /// Keep only the latest release and live version per slot.
    Latest,
}

const fn serial_package_scope() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScanConfig {
    /// Worker count. Unset leaves the choice to the scheduler.
    #[serde(default)]
    pub jobs: Option<usize>,

    #[serde(default)]
    pub filter: Option<VersionFilter>,

    /// Run package-scope scans serially unless jobs are set explicitly.
    #[serde(default = "serial_package_scope")]
    pub serial_package_scope: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            jobs: None,
            filter: None,
            serial_package_scope: serial_package_scope(),
        }
    }
}

impl ScanConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.jobs == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "scan.jobs".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}
