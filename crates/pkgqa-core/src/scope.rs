//! Scan scopes.
//!
//! A scope is both the granularity of entities a check wants to be fed and the
//! knob the pipeline scheduler uses to pick a concurrency strategy.
//!
//! ```text
//! eclass < version < package < category < repository < commit
//! ```
//!
//! `Commit` is the side channel for historical scans: it sorts after every
//! repository granularity so scheduling treats it as coarse work.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::CoreError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Eclass,
    Version,
    Package,
    Category,
    Repository,
    Commit,
}

impl Scope {
    pub const ALL: [Self; 6] = [
        Self::Eclass,
        Self::Version,
        Self::Package,
        Self::Category,
        Self::Repository,
        Self::Commit,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eclass => "eclass",
            Self::Version => "version",
            Self::Package => "package",
            Self::Category => "category",
            Self::Repository => "repository",
            Self::Commit => "commit",
        }
    }

    /// Whether work at this scope can be split per package identity.
    ///
    /// Only version and package scopes qualify. Eclass and commit scopes are
    /// side channels that always run against the whole restriction.
    #[must_use]
    pub const fn is_package_granular(self) -> bool {
        matches!(self, Self::Version | Self::Package)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eclass" => Ok(Self::Eclass),
            "version" | "ver" => Ok(Self::Version),
            "package" | "pkg" => Ok(Self::Package),
            "category" | "cat" => Ok(Self::Category),
            "repository" | "repo" => Ok(Self::Repository),
            "commit" | "git" => Ok(Self::Commit),
            other => Err(CoreError::UnknownScope(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn granularity_order() {
        assert!(Scope::Eclass < Scope::Version);
        assert!(Scope::Version < Scope::Package);
        assert!(Scope::Package < Scope::Category);
        assert!(Scope::Category < Scope::Repository);
        assert!(Scope::Repository < Scope::Commit);
    }

    #[test]
    fn package_granular_scopes() {
        let granular: Vec<Scope> = Scope::ALL
            .into_iter()
            .filter(|s| s.is_package_granular())
            .collect();
        assert_eq!(granular, vec![Scope::Version, Scope::Package]);
    }

    #[test]
    fn parse_roundtrips_display() {
        for scope in Scope::ALL {
            assert_eq!(scope.as_str().parse::<Scope>().unwrap(), scope);
        }
        assert_eq!("pkg".parse::<Scope>().unwrap(), Scope::Package);
        assert!(matches!(
            "world".parse::<Scope>(),
            Err(CoreError::UnknownScope(name)) if name == "world"
        ));
    }
}
