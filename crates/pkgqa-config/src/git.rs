//! Git history configuration.

use serde::{Deserialize, Serialize};

fn default_upstream_ref() -> String {
    "origin/HEAD".into()
}

fn default_local_ref() -> String {
    "master".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GitConfig {
    /// Upstream reference the history cache tracks.
    #[serde(default = "default_upstream_ref")]
    pub upstream_ref: String,

    /// Local branch scanned for unpushed commits.
    #[serde(default = "default_local_ref")]
    pub local_ref: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            upstream_ref: default_upstream_ref(),
            local_ref: default_local_ref(),
        }
    }
}
