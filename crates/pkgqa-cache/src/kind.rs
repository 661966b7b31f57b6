//! Registry of cache types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CacheError;

/// A registered cache type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    Profiles,
    Eclass,
    Git,
}

/// On-disk identity of a cache type.
///
/// Bumping `version` discards every existing file of that type on next load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSpec {
    pub kind: CacheKind,
    pub file: &'static str,
    pub version: u32,
}

impl CacheKind {
    pub const ALL: [Self; 3] = [Self::Profiles, Self::Eclass, Self::Git];

    #[must_use]
    pub const fn spec(self) -> CacheSpec {
        match self {
            Self::Profiles => CacheSpec {
                kind: self,
                file: "profiles.json",
                version: 2,
            },
            Self::Eclass => CacheSpec {
                kind: self,
                file: "eclass.json",
                version: 1,
            },
            Self::Git => CacheSpec {
                kind: self,
                file: "git.json",
                version: 4,
            },
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::Eclass => "eclass",
            Self::Git => "git",
        }
    }

    /// Cache type owning the given file name, if any.
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.spec().file == name)
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CacheError::UnknownKind(s.to_string()))
    }
}
