//! Findings reported by checks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::entity::{Cpv, PackageKey};
use crate::errors::CoreError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Style,
    Warning,
    Error,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Style => "style",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "style" => Ok(Self::Style),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(CoreError::UnknownSeverity(other.to_string())),
        }
    }
}

/// What a finding is about.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "name", rename_all = "snake_case")]
pub enum Target {
    Repository,
    Category(String),
    Package(PackageKey),
    Version(Cpv),
    Eclass(String),
    Commit(String),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repository => f.write_str("repository"),
            Self::Category(cat) => f.write_str(cat),
            Self::Package(key) => key.fmt(f),
            Self::Version(cpv) => cpv.fmt(f),
            Self::Eclass(name) => write!(f, "{name}.eclass"),
            Self::Commit(hash) => write!(f, "commit {hash}"),
        }
    }
}

/// A single QA result.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Finding {
    pub target: Target,
    /// Result class name, e.g. `MissingSlotDep`.
    pub kind: String,
    pub message: String,
    pub severity: Severity,
}

impl Finding {
    #[must_use]
    pub fn new(
        target: Target,
        kind: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            target,
            kind: kind.into(),
            message: message.into(),
            severity,
        }
    }

    /// Finding kind emitted for package metadata that failed to load.
    pub const METADATA_ERROR: &'static str = "MetadataError";

    /// Convert a metadata failure into a reportable finding.
    ///
    /// Multi-line messages are flattened so the finding stays one line.
    #[must_use]
    pub fn metadata_error(err: &MetadataError) -> Self {
        let detail = err
            .error
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(": ");
        Self::new(
            Target::Version(err.pkg.clone()),
            Self::METADATA_ERROR,
            Severity::Error,
            format!("attr({}): {detail}", err.attr),
        )
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.target, self.kind, self.message)
    }
}

/// Failure to load package metadata, surfaced by a check or its source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetadataError {
    pub pkg: Cpv,
    pub attr: String,
    pub error: String,
}

impl MetadataError {
    #[must_use]
    pub fn new(pkg: Cpv, attr: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            pkg,
            attr: attr.into(),
            error: error.into(),
        }
    }

    /// Identity used to report each distinct failure once per pipeline.
    #[must_use]
    pub fn dedup_key(&self) -> (Cpv, String) {
        (self.pkg.clone(), self.error.clone())
    }
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: attr({}): {}", self.pkg, self.attr, self.error)
    }
}

impl std::error::Error for MetadataError {}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("info", Severity::Info)]
    #[case("warn", Severity::Warning)]
    #[case("error", Severity::Error)]
    fn severity_parses(#[case] input: &str, #[case] expected: Severity) {
        assert_eq!(input.parse::<Severity>().unwrap(), expected);
    }

    #[test]
    fn metadata_error_flattens_message() {
        let err = MetadataError::new(
            Cpv::new("cat", "a", "1"),
            "depend",
            "bad dep\n  unmatched paren\n",
        );
        let finding = Finding::metadata_error(&err);
        assert_eq!(finding.kind, "MetadataError");
        assert_eq!(finding.message, "attr(depend): bad dep: unmatched paren");
        assert_eq!(finding.to_string(), "cat/a-1: MetadataError: attr(depend): bad dep: unmatched paren");
    }

    #[test]
    fn dedup_key_ignores_attr() {
        let a = MetadataError::new(Cpv::new("cat", "a", "1"), "depend", "boom");
        let b = MetadataError::new(Cpv::new("cat", "a", "1"), "rdepend", "boom");
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn findings_sort_by_target_first() {
        let mut findings = vec![
            Finding::new(Target::Version(Cpv::new("b", "x", "1")), "K", Severity::Info, "m"),
            Finding::new(Target::Repository, "K", Severity::Info, "m"),
            Finding::new(Target::Category("a".into()), "K", Severity::Info, "m"),
        ];
        findings.sort();
        assert_eq!(findings[0].target, Target::Repository);
        assert_eq!(findings[1].target, Target::Category("a".into()));
    }
}
