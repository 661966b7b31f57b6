//! Scoped entity sources.
//!
//! A [`Source`] is a closed set of variants composed by explicit wrapping.
//! Every variant streams lazily and can be streamed again with another
//! restriction; no state survives between calls except metadata errors the
//! backing repository collects out of band.

use std::collections::BTreeMap;
use std::sync::Arc;

use pkgqa_core::{Eclass, Entity, GitCommit, MetadataError, PkgItem, Restriction, Scope, SyntaxParser};

use crate::filters::{GroupAdjacent, GroupKey, LatestSlots, dedup_adjacent};
use crate::repo::Repository;

pub type EntityIter<'a> = Box<dyn Iterator<Item = Entity> + 'a>;

#[derive(Debug, Clone)]
pub enum Source {
    /// Yields nothing at the given scope.
    Empty(Scope),
    /// Versions from a repository.
    Repo(Arc<dyn Repository>),
    /// Unparsed versioned identities from a repository.
    Raw(Arc<dyn Repository>),
    /// Inner source narrowed by a fixed restriction.
    Restricted {
        inner: Box<Source>,
        restriction: Restriction,
    },
    /// Latest release and live version per slot.
    Latest { inner: Box<Source>, partial: bool },
    /// Versions with lazily read file lines.
    Lines(Box<Source>),
    /// Versions with lazily parsed syntax trees.
    Parsed {
        inner: Box<Source>,
        parser: Arc<dyn SyntaxParser>,
    },
    /// Adjacent versions merged into package or category lists.
    Grouped { inner: Box<Source>, key: GroupKey },
    /// Individual versions fed to repository-wide checks.
    Repository(Box<Source>),
    /// Distinct unversioned identities.
    Unversioned(Box<Source>),
    /// Distinct versioned identities.
    Versioned(Box<Source>),
    /// Eclasses keyed by name.
    Eclass(Arc<BTreeMap<String, Eclass>>),
    /// Commits in history order.
    Commits(Arc<Vec<GitCommit>>),
}

impl Source {
    #[must_use]
    pub fn repo(repo: Arc<dyn Repository>) -> Self {
        Self::Repo(repo)
    }

    #[must_use]
    pub fn raw(repo: Arc<dyn Repository>) -> Self {
        Self::Raw(repo)
    }

    /// Default source for `scope` over a repository.
    ///
    /// Eclass and commit scopes need their own data and yield `None`.
    #[must_use]
    pub fn scoped(repo: Arc<dyn Repository>, scope: Scope, latest: bool) -> Option<Self> {
        let mut versions = Self::repo(repo);
        if latest {
            versions = versions.latest(false);
        }
        match scope {
            Scope::Version => Some(versions),
            Scope::Package => Some(versions.grouped(GroupKey::Package)),
            Scope::Category => Some(versions.grouped(GroupKey::Category)),
            Scope::Repository => Some(versions.repository()),
            Scope::Eclass | Scope::Commit => None,
        }
    }

    #[must_use]
    pub fn restricted(self, restriction: Restriction) -> Self {
        Self::Restricted {
            inner: Box::new(self),
            restriction,
        }
    }

    #[must_use]
    pub fn latest(self, partial: bool) -> Self {
        Self::Latest {
            inner: Box::new(self),
            partial,
        }
    }

    #[must_use]
    pub fn with_lines(self) -> Self {
        Self::Lines(Box::new(self))
    }

    #[must_use]
    pub fn parsed(self, parser: Arc<dyn SyntaxParser>) -> Self {
        Self::Parsed {
            inner: Box::new(self),
            parser,
        }
    }

    #[must_use]
    pub fn grouped(self, key: GroupKey) -> Self {
        Self::Grouped {
            inner: Box::new(self),
            key,
        }
    }

    #[must_use]
    pub fn repository(self) -> Self {
        Self::Repository(Box::new(self))
    }

    #[must_use]
    pub fn unversioned(self) -> Self {
        Self::Unversioned(Box::new(self))
    }

    #[must_use]
    pub fn versioned(self) -> Self {
        Self::Versioned(Box::new(self))
    }

    #[must_use]
    pub fn eclasses(eclasses: impl Into<Arc<BTreeMap<String, Eclass>>>) -> Self {
        Self::Eclass(eclasses.into())
    }

    #[must_use]
    pub fn commits(commits: impl Into<Arc<Vec<GitCommit>>>) -> Self {
        Self::Commits(commits.into())
    }

    /// Granularity of the entities this source yields.
    #[must_use]
    pub fn scope(&self) -> Scope {
        match self {
            Self::Empty(scope) => *scope,
            Self::Repo(_) | Self::Raw(_) | Self::Versioned(_) => Scope::Version,
            Self::Restricted { inner, .. }
            | Self::Latest { inner, .. }
            | Self::Lines(inner)
            | Self::Parsed { inner, .. } => inner.scope(),
            Self::Grouped {
                key: GroupKey::Package,
                ..
            }
            | Self::Unversioned(_) => Scope::Package,
            Self::Grouped {
                key: GroupKey::Category,
                ..
            } => Scope::Category,
            Self::Repository(_) => Scope::Repository,
            Self::Eclass(_) => Scope::Eclass,
            Self::Commits(_) => Scope::Commit,
        }
    }

    /// Stream entities matching `restriction`, in deterministic order.
    pub fn stream(&self, restriction: &Restriction) -> EntityIter<'_> {
        match self {
            Self::Empty(_) => Box::new(std::iter::empty()),
            Self::Repo(repo) => Box::new(
                repo.itermatch(restriction)
                    .map(|pkg| Entity::Version(PkgItem::new(pkg))),
            ),
            Self::Raw(repo) => Box::new(repo.raw_cpvs(restriction).map(Entity::Cpv)),
            Self::Restricted {
                inner,
                restriction: fixed,
            } => inner.stream(&fixed.clone().and(restriction.clone())),
            Self::Latest { inner, partial } => {
                Box::new(LatestSlots::new(inner.stream(restriction), *partial))
            }
            Self::Lines(inner) => Box::new(
                inner
                    .stream(restriction)
                    .map(|entity| map_items(entity, PkgItem::with_lines)),
            ),
            Self::Parsed { inner, parser } => Box::new(inner.stream(restriction).map(move |entity| {
                map_items(entity, |item| item.with_parser(Arc::clone(parser)))
            })),
            Self::Grouped { inner, key } => {
                Box::new(GroupAdjacent::new(inner.stream(restriction), *key))
            }
            Self::Repository(inner) => inner.stream(restriction),
            Self::Unversioned(inner) => Box::new(
                dedup_adjacent(inner.stream(restriction).filter_map(|entity| match entity {
                    Entity::Version(item) => Some(item.pkg().key()),
                    Entity::Cpv(cpv) => Some(cpv.key()),
                    Entity::Key(key) => Some(key),
                    _ => None,
                }))
                .map(Entity::Key),
            ),
            Self::Versioned(inner) => Box::new(
                dedup_adjacent(inner.stream(restriction).filter_map(|entity| match entity {
                    Entity::Version(item) => Some(item.into_pkg().cpv),
                    Entity::Cpv(cpv) => Some(cpv),
                    _ => None,
                }))
                .map(Entity::Cpv),
            ),
            Self::Eclass(eclasses) => {
                let restriction = restriction.clone();
                Box::new(
                    eclasses
                        .values()
                        .filter(move |eclass| restriction.matches_eclass(eclass))
                        .cloned()
                        .map(Entity::Eclass),
                )
            }
            Self::Commits(commits) => {
                let restriction = restriction.clone();
                Box::new(
                    commits
                        .iter()
                        .filter(move |commit| {
                            restriction == Restriction::All
                                || commit.pkgs.iter().any(|cpv| restriction.matches_key(&cpv.key()))
                        })
                        .cloned()
                        .map(Entity::Commit),
                )
            }
        }
    }

    /// Drain metadata errors the backing repository collected while streaming.
    #[must_use]
    pub fn take_metadata_errors(&self) -> Vec<MetadataError> {
        match self {
            Self::Repo(repo) | Self::Raw(repo) => repo.take_metadata_errors(),
            Self::Restricted { inner, .. }
            | Self::Latest { inner, .. }
            | Self::Lines(inner)
            | Self::Parsed { inner, .. }
            | Self::Grouped { inner, .. }
            | Self::Repository(inner)
            | Self::Unversioned(inner)
            | Self::Versioned(inner) => inner.take_metadata_errors(),
            Self::Empty(_) | Self::Eclass(_) | Self::Commits(_) => Vec::new(),
        }
    }

    /// Backing repository, if any.
    #[must_use]
    pub fn repository_ref(&self) -> Option<&Arc<dyn Repository>> {
        match self {
            Self::Repo(repo) | Self::Raw(repo) => Some(repo),
            Self::Restricted { inner, .. }
            | Self::Latest { inner, .. }
            | Self::Lines(inner)
            | Self::Parsed { inner, .. }
            | Self::Grouped { inner, .. }
            | Self::Repository(inner)
            | Self::Unversioned(inner)
            | Self::Versioned(inner) => inner.repository_ref(),
            Self::Empty(_) | Self::Eclass(_) | Self::Commits(_) => None,
        }
    }
}

fn map_items(entity: Entity, f: impl Fn(PkgItem) -> PkgItem) -> Entity {
    match entity {
        Entity::Version(item) => Entity::Version(f(item)),
        Entity::Package(items) => Entity::Package(items.into_iter().map(f).collect()),
        Entity::Category(items) => Entity::Category(items.into_iter().map(f).collect()),
        other => other,
    }
}
