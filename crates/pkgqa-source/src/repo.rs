//! Repository collaborator consulted by sources.

use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use pkgqa_core::{Cpv, MetadataError, Package, Restriction};

/// A package repository as seen by the scan engine.
///
/// Implementations own package parsing and version ordering. The engine only
/// relies on the ordering contract of [`Repository::itermatch`].
pub trait Repository: Send + Sync + fmt::Debug {
    /// Identifier used to locate this repository's caches.
    fn repo_id(&self) -> &Path {
        self.location()
    }

    /// Root directory of the repository tree.
    fn location(&self) -> &Path;

    /// Matching packages sorted by identity, versions ascending within one
    /// identity.
    fn itermatch(&self, restriction: &Restriction) -> Box<dyn Iterator<Item = Package> + '_>;

    /// Matching identities without building full packages. Tolerates
    /// identities that would fail to parse as packages.
    fn raw_cpvs(&self, restriction: &Restriction) -> Box<dyn Iterator<Item = Cpv> + '_> {
        Box::new(self.itermatch(restriction).map(|pkg| pkg.cpv))
    }

    /// Drain metadata errors collected while iterating.
    fn take_metadata_errors(&self) -> Vec<MetadataError> {
        Vec::new()
    }
}

/// Repository backed by an in-memory package list.
#[derive(Debug, Default)]
pub struct MemoryRepo {
    location: PathBuf,
    pkgs: Vec<Package>,
    raw: Vec<Cpv>,
    errors: Mutex<Vec<MetadataError>>,
    pending_errors: Mutex<Vec<MetadataError>>,
}

impl MemoryRepo {
    /// Build from packages; a stable sort by identity keeps the given
    /// version order within each package.
    pub fn new(location: impl Into<PathBuf>, pkgs: impl IntoIterator<Item = Package>) -> Self {
        let mut pkgs: Vec<Package> = pkgs.into_iter().collect();
        pkgs.sort_by(|a, b| a.key().cmp(&b.key()));
        Self {
            location: location.into(),
            pkgs,
            ..Self::default()
        }
    }

    /// Extra identities only visible through [`Repository::raw_cpvs`].
    #[must_use]
    pub fn with_raw(mut self, raw: impl IntoIterator<Item = Cpv>) -> Self {
        self.raw = raw.into_iter().collect();
        self
    }

    /// Metadata errors reported out of band by the first iteration that
    /// reaches a package.
    #[must_use]
    pub fn with_metadata_errors(mut self, errors: impl IntoIterator<Item = MetadataError>) -> Self {
        *self.pending_errors.get_mut() = errors.into_iter().collect();
        self
    }

    pub fn len(&self) -> usize {
        self.pkgs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pkgs.is_empty()
    }
}

impl Repository for MemoryRepo {
    fn location(&self) -> &Path {
        &self.location
    }

    fn itermatch(&self, restriction: &Restriction) -> Box<dyn Iterator<Item = Package> + '_> {
        let restriction = restriction.clone();
        let mut queued = false;
        Box::new(self.pkgs.iter().filter_map(move |pkg| {
            if !queued {
                queued = true;
                let pending = std::mem::take(&mut *self.pending_errors.lock());
                self.errors.lock().extend(pending);
            }
            restriction.matches_pkg(pkg).then(|| pkg.clone())
        }))
    }

    fn raw_cpvs(&self, restriction: &Restriction) -> Box<dyn Iterator<Item = Cpv> + '_> {
        let mut cpvs: Vec<Cpv> = self
            .pkgs
            .iter()
            .filter(|pkg| restriction.matches_pkg(pkg))
            .map(|pkg| pkg.cpv.clone())
            .collect();
        cpvs.extend(self.raw.iter().filter(|cpv| restriction.matches_key(&cpv.key())).cloned());
        cpvs.sort_by(|a, b| a.key().cmp(&b.key()));
        Box::new(cpvs.into_iter())
    }

    fn take_metadata_errors(&self) -> Vec<MetadataError> {
        std::mem::take(&mut *self.errors.lock())
    }
}
