//! Entities streamed through scan pipelines.
//!
//! Every entity is an owned value that can be cloned into another worker and
//! serialized. Lazily derived content (file lines, syntax trees) is attached
//! to a [`PkgItem`] by the source that wraps it and is computed on first
//! access, so checks that never look at it pay nothing.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::finding::{MetadataError, Target};
use crate::syntax::{SyntaxParser, SyntaxTree};

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// Unversioned package identity, `category/package`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageKey {
    pub category: String,
    pub package: String,
}

impl PackageKey {
    #[must_use]
    pub fn new(category: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            package: package.into(),
        }
    }
}

impl fmt::Display for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.package)
    }
}

impl FromStr for PackageKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| CoreError::InvalidKey {
            key: s.to_string(),
            reason: reason.to_string(),
        };
        let (category, package) = s.split_once('/').ok_or_else(|| invalid("missing '/'"))?;
        if category.is_empty() || package.is_empty() {
            return Err(invalid("empty category or package"));
        }
        if package.contains('/') {
            return Err(invalid("too many path components"));
        }
        Ok(Self::new(category, package))
    }
}

/// Versioned package identity, `category/package-version`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cpv {
    pub category: String,
    pub package: String,
    pub version: String,
}

impl Cpv {
    #[must_use]
    pub fn new(
        category: impl Into<String>,
        package: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            package: package.into(),
            version: version.into(),
        }
    }

    #[must_use]
    pub fn key(&self) -> PackageKey {
        PackageKey::new(self.category.clone(), self.package.clone())
    }
}

impl fmt::Display for Cpv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}-{}", self.category, self.package, self.version)
    }
}

// ---------------------------------------------------------------------------
// Package
// ---------------------------------------------------------------------------

/// A package version as handed over by the repository layer.
///
/// Versions of one package arrive in ascending order; the engine never
/// compares versions itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Package {
    pub cpv: Cpv,
    pub slot: String,
    /// Version-control ("live") ebuild that tracks an upstream branch.
    #[serde(default)]
    pub live: bool,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Backing file, if the package came from disk.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Package {
    #[must_use]
    pub fn new(cpv: Cpv, slot: impl Into<String>) -> Self {
        Self {
            cpv,
            slot: slot.into(),
            live: false,
            keywords: Vec::new(),
            path: None,
        }
    }

    #[must_use]
    pub const fn live(mut self, live: bool) -> Self {
        self.live = live;
        self
    }

    #[must_use]
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn key(&self) -> PackageKey {
        self.cpv.key()
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.cpv.category
    }

    /// Slot partition used by latest-version reduction; live versions get
    /// their own partition per slot.
    #[must_use]
    pub fn slot_key(&self) -> String {
        if self.live {
            format!("vcs-{}", self.slot)
        } else {
            self.slot.clone()
        }
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.cpv.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// PkgItem
// ---------------------------------------------------------------------------

type Lazy<T> = Arc<OnceLock<Result<T, String>>>;

#[derive(Debug, Clone, Default)]
enum Content {
    #[default]
    None,
    Lines(Lazy<Arc<[String]>>),
    Parsed {
        parser: Arc<dyn SyntaxParser>,
        data: Lazy<Arc<[u8]>>,
        tree: Lazy<Arc<SyntaxTree>>,
    },
}

/// One version flowing through a pipeline.
///
/// Carries the package, whether it was superseded by latest-slot reduction,
/// and any lazily derived content a wrapping source attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkgItem {
    pkg: Package,
    #[serde(default)]
    filtered: bool,
    #[serde(skip)]
    content: Content,
}

impl PkgItem {
    #[must_use]
    pub fn new(pkg: Package) -> Self {
        Self {
            pkg,
            filtered: false,
            content: Content::None,
        }
    }

    /// A version superseded by a newer one in the same slot.
    #[must_use]
    pub fn filtered(pkg: Package) -> Self {
        Self {
            filtered: true,
            ..Self::new(pkg)
        }
    }

    #[must_use]
    pub const fn pkg(&self) -> &Package {
        &self.pkg
    }

    #[must_use]
    pub fn into_pkg(self) -> Package {
        self.pkg
    }

    #[must_use]
    pub const fn is_filtered(&self) -> bool {
        self.filtered
    }

    /// Attach file lines, read on first call to [`PkgItem::lines`].
    #[must_use]
    pub fn with_lines(mut self) -> Self {
        self.content = Content::Lines(Arc::default());
        self
    }

    /// Attach raw bytes and a syntax tree, produced on first access.
    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn SyntaxParser>) -> Self {
        self.content = Content::Parsed {
            parser,
            data: Arc::default(),
            tree: Arc::default(),
        };
        self
    }

    /// Whether any derived content has been computed yet.
    #[must_use]
    pub fn content_loaded(&self) -> bool {
        match &self.content {
            Content::None => false,
            Content::Lines(lines) => lines.get().is_some(),
            Content::Parsed { data, .. } => data.get().is_some(),
        }
    }

    /// File lines, newline terminators kept.
    pub fn lines(&self) -> Result<Arc<[String]>, MetadataError> {
        let Content::Lines(cell) = &self.content else {
            return Err(self.metadata_error("lines", "no file contents attached"));
        };
        cell.get_or_init(|| {
            let text = read_backing(self.pkg.path.as_deref(), |p| std::fs::read_to_string(p))?;
            Ok(text.split_inclusive('\n').map(str::to_string).collect())
        })
        .clone()
        .map_err(|e| self.metadata_error("lines", e))
    }

    /// Raw file bytes.
    pub fn data(&self) -> Result<Arc<[u8]>, MetadataError> {
        let Content::Parsed { data, .. } = &self.content else {
            return Err(self.metadata_error("data", "no parse tree attached"));
        };
        data.get_or_init(|| read_backing(self.pkg.path.as_deref(), |p| std::fs::read(p)).map(Arc::from))
            .clone()
            .map_err(|e| self.metadata_error("data", e))
    }

    /// Parse tree of the file bytes.
    pub fn tree(&self) -> Result<Arc<SyntaxTree>, MetadataError> {
        let Content::Parsed { parser, tree, .. } = &self.content else {
            return Err(self.metadata_error("tree", "no parse tree attached"));
        };
        let data = self.data()?;
        tree.get_or_init(|| parser.parse(&data).map(Arc::new))
            .clone()
            .map_err(|e| self.metadata_error("tree", e))
    }

    fn metadata_error(&self, attr: &str, error: impl Into<String>) -> MetadataError {
        MetadataError::new(self.pkg.cpv.clone(), attr, error)
    }
}

fn read_backing<T>(
    path: Option<&Path>,
    read: impl FnOnce(&Path) -> std::io::Result<T>,
) -> Result<T, String> {
    let path = path.ok_or_else(|| "package has no backing file".to_string())?;
    read(path).map_err(|e| format!("{}: {e}", path.display()))
}

impl From<Package> for PkgItem {
    fn from(pkg: Package) -> Self {
        Self::new(pkg)
    }
}

// ---------------------------------------------------------------------------
// Eclass
// ---------------------------------------------------------------------------

/// An eclass file, ordered by name and then resolved path.
///
/// The name is the file stem, so one resolved path always carries one name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Eclass {
    pub name: String,
    pub path: PathBuf,
}

impl Eclass {
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self {
            name: name.into(),
            path: path.canonicalize().unwrap_or_else(|_| path.to_path_buf()),
        }
    }

    /// File lines; a vanished file reads as empty.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        std::fs::read_to_string(&self.path)
            .map(|text| text.split_inclusive('\n').map(str::to_string).collect())
            .unwrap_or_default()
    }
}

impl fmt::Display for Eclass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ---------------------------------------------------------------------------
// Git history
// ---------------------------------------------------------------------------

/// Status of a package file change in a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChangeStatus {
    #[serde(rename = "A")]
    Added,
    #[serde(rename = "M")]
    Modified,
    #[serde(rename = "D")]
    Removed,
    #[serde(rename = "R")]
    Renamed,
}

impl ChangeStatus {
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            Self::Added => 'A',
            Self::Modified => 'M',
            Self::Removed => 'D',
            Self::Renamed => 'R',
        }
    }

    #[must_use]
    pub const fn from_char(c: char) -> Option<Self> {
        match c {
            'A' => Some(Self::Added),
            'M' => Some(Self::Modified),
            'D' => Some(Self::Removed),
            'R' => Some(Self::Renamed),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A commit parsed from history, with the package versions it touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitCommit {
    pub hash: String,
    pub commit_date: NaiveDate,
    pub author: String,
    pub committer: String,
    pub message: Vec<String>,
    #[serde(default)]
    pub pkgs: Vec<Cpv>,
}

impl PartialEq for GitCommit {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for GitCommit {}

impl std::hash::Hash for GitCommit {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl fmt::Display for GitCommit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hash)
    }
}

/// A single package version change recorded in history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GitPkgChange {
    pub atom: Cpv,
    pub status: ChangeStatus,
    pub commit: String,
    pub commit_date: NaiveDate,
    /// Previous identity for renames kept as a single change.
    #[serde(default)]
    pub old: Option<Cpv>,
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// One unit streamed through a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Entity {
    /// A single version.
    Version(PkgItem),
    /// All versions of one package.
    Package(Vec<PkgItem>),
    /// All versions of one category.
    Category(Vec<PkgItem>),
    /// Unversioned identity, produced by identity-enumerating sources.
    Key(PackageKey),
    /// Versioned identity, produced by identity-enumerating sources.
    Cpv(Cpv),
    Eclass(Eclass),
    Commit(GitCommit),
    Change(GitPkgChange),
}

impl Entity {
    /// What a finding about this entity is attached to.
    #[must_use]
    pub fn target(&self) -> Target {
        match self {
            Self::Version(item) => Target::Version(item.pkg().cpv.clone()),
            Self::Package(items) => items.first().map_or(Target::Repository, |item| {
                Target::Package(item.pkg().key())
            }),
            Self::Category(items) => items.first().map_or(Target::Repository, |item| {
                Target::Category(item.pkg().category().to_string())
            }),
            Self::Key(key) => Target::Package(key.clone()),
            Self::Cpv(cpv) => Target::Version(cpv.clone()),
            Self::Eclass(eclass) => Target::Eclass(eclass.name.clone()),
            Self::Commit(commit) => Target::Commit(commit.hash.clone()),
            Self::Change(change) => Target::Version(change.atom.clone()),
        }
    }

    /// The single version this entity wraps, if any.
    #[must_use]
    pub const fn as_version(&self) -> Option<&PkgItem> {
        match self {
            Self::Version(item) => Some(item),
            _ => None,
        }
    }

    /// Versions carried by this entity, in stream order.
    #[must_use]
    pub fn versions(&self) -> &[PkgItem] {
        match self {
            Self::Version(item) => std::slice::from_ref(item),
            Self::Package(items) | Self::Category(items) => items,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pkg(cat: &str, name: &str, ver: &str) -> Package {
        Package::new(Cpv::new(cat, name, ver), "0")
    }

    #[test]
    fn key_parses_and_displays() {
        let key: PackageKey = "dev-util/foo".parse().unwrap();
        assert_eq!(key, PackageKey::new("dev-util", "foo"));
        assert_eq!(key.to_string(), "dev-util/foo");
        assert!("dev-util".parse::<PackageKey>().is_err());
        assert!("/foo".parse::<PackageKey>().is_err());
        assert!("a/b/c".parse::<PackageKey>().is_err());
    }

    #[test]
    fn live_versions_get_their_own_slot_partition() {
        let release = pkg("cat", "a", "1");
        let live = pkg("cat", "a", "9999").live(true);
        assert_eq!(release.slot_key(), "0");
        assert_eq!(live.slot_key(), "vcs-0");
    }

    #[test]
    fn lines_are_read_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a-1.ebuild");
        std::fs::write(&path, "EAPI=8\nSLOT=0\n").unwrap();

        let item = PkgItem::new(pkg("cat", "a", "1").with_path(&path)).with_lines();
        assert!(!item.content_loaded());
        let lines = item.lines().unwrap();
        assert_eq!(&*lines, ["EAPI=8\n".to_string(), "SLOT=0\n".to_string()]);
        assert!(item.content_loaded());
    }

    #[test]
    fn lines_without_injection_is_metadata_error() {
        let item = PkgItem::new(pkg("cat", "a", "1"));
        let err = item.lines().unwrap_err();
        assert_eq!(err.attr, "lines");
        assert_eq!(err.pkg, Cpv::new("cat", "a", "1"));
    }

    #[derive(Debug)]
    struct WordParser;

    impl SyntaxParser for WordParser {
        fn parse(&self, data: &[u8]) -> Result<SyntaxTree, String> {
            if data.is_empty() {
                return Err("empty file".into());
            }
            Ok(SyntaxTree::leaf("program", 0..data.len()))
        }
    }

    #[test]
    fn parse_tree_is_shared_between_clones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a-1.ebuild");
        std::fs::write(&path, "inherit foo\n").unwrap();

        let item = PkgItem::new(pkg("cat", "a", "1").with_path(&path))
            .with_parser(Arc::new(WordParser));
        let copy = item.clone();
        assert_eq!(item.tree().unwrap().bytes, 0..12);
        assert!(copy.content_loaded());
        assert_eq!(&*copy.data().unwrap(), b"inherit foo\n");
    }

    #[test]
    fn parse_failure_surfaces_as_metadata_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a-1.ebuild");
        std::fs::write(&path, "").unwrap();

        let item = PkgItem::new(pkg("cat", "a", "1").with_path(&path))
            .with_parser(Arc::new(WordParser));
        let err = item.tree().unwrap_err();
        assert_eq!(err.attr, "tree");
        assert_eq!(err.error, "empty file");
    }

    #[test]
    fn eclass_order_agrees_with_equality() {
        let a = Eclass::new("alpha", "/nonexistent/alpha.eclass");
        let same = Eclass::new("alpha", "/nonexistent/alpha.eclass");
        let moved = Eclass::new("alpha", "/other/alpha.eclass");
        let b = Eclass::new("beta", "/nonexistent/beta.eclass");
        assert_eq!(a, same);
        assert_eq!(a.cmp(&same), std::cmp::Ordering::Equal);
        assert_ne!(a, moved);
        assert!(a < moved);
        assert!(moved < b);

        let set: std::collections::BTreeSet<_> = [b.clone(), same, a.clone()].into_iter().collect();
        assert_eq!(set.into_iter().collect::<Vec<_>>(), [a, b]);
        assert!(Eclass::new("gone", "/nonexistent/gone.eclass").lines().is_empty());
    }

    #[test]
    fn entity_targets() {
        let item = PkgItem::new(pkg("cat", "a", "1"));
        assert_eq!(
            Entity::Version(item.clone()).target(),
            Target::Version(Cpv::new("cat", "a", "1"))
        );
        assert_eq!(
            Entity::Package(vec![item.clone()]).target(),
            Target::Package(PackageKey::new("cat", "a"))
        );
        assert_eq!(
            Entity::Category(vec![item]).target(),
            Target::Category("cat".into())
        );
    }

    #[test]
    fn entity_serializes_without_lazy_content() {
        let entity = Entity::Version(PkgItem::new(pkg("cat", "a", "1")).with_lines());
        let json = serde_json::to_string(&entity).unwrap();
        let back: Entity = serde_json::from_str(&json).unwrap();
        assert_eq!(back.target(), entity.target());
        assert!(!back.versions()[0].content_loaded());
    }
}
