//! Package history folded from git logs.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use pkgqa_core::{ChangeStatus, Cpv, Entity, GitPkgChange, Restriction};
use serde::{Deserialize, Serialize};

/// One recorded change of a package version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub status: ChangeStatus,
    pub version: String,
    pub date: NaiveDate,
    pub commit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Cpv>,
}

/// Changes per `category/package`, newest first.
pub type HistoryData = BTreeMap<String, Vec<HistoryRecord>>;

/// Cached history of one repository at a given upstream commit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GitCache {
    pub commit: String,
    pub data: HistoryData,
}

/// Fold one walk's parsed changes into `data`.
///
/// Within a walk only the first change per (version, status) pair is kept,
/// so newest-first history records each addition or removal once.
pub fn fold_changes(changes: impl IntoIterator<Item = GitPkgChange>, data: &mut HistoryData) {
    let mut seen: HashSet<(Cpv, ChangeStatus)> = HashSet::new();
    let mut fresh: HistoryData = BTreeMap::new();
    for change in changes {
        if !seen.insert((change.atom.clone(), change.status)) {
            continue;
        }
        fresh
            .entry(change.atom.key().to_string())
            .or_default()
            .push(HistoryRecord {
                status: change.status,
                version: change.atom.version,
                date: change.commit_date,
                commit: change.commit,
                old: change.old,
            });
    }

    // newer walks go in front of what was cached before
    for (key, mut records) in fresh {
        let existing = data.entry(key).or_default();
        records.append(existing);
        *existing = records;
    }
}

/// Which changes a history view exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    Changed,
    Modified,
    Added,
    Removed,
}

impl StatusFilter {
    #[must_use]
    pub const fn allows(self, status: ChangeStatus) -> bool {
        match self {
            Self::Changed => true,
            Self::Modified => matches!(status, ChangeStatus::Added | ChangeStatus::Modified),
            Self::Added => matches!(status, ChangeStatus::Added),
            Self::Removed => matches!(status, ChangeStatus::Removed),
        }
    }
}

/// Queryable package history of one or more repositories.
#[derive(Debug, Clone)]
pub struct HistoryRepo {
    repo_id: PathBuf,
    data: HistoryData,
    filter: StatusFilter,
}

impl HistoryRepo {
    #[must_use]
    pub fn new(repo_id: impl Into<PathBuf>, data: HistoryData, filter: StatusFilter) -> Self {
        Self {
            repo_id: repo_id.into(),
            data,
            filter,
        }
    }

    #[must_use]
    pub fn repo_id(&self) -> &Path {
        &self.repo_id
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Changes matching `restriction`, grouped by package, newest first.
    #[must_use]
    pub fn changes(&self, restriction: &Restriction) -> Vec<GitPkgChange> {
        let mut out = Vec::new();
        for (key, records) in &self.data {
            let Some((category, package)) = key.split_once('/') else {
                continue;
            };
            for record in records {
                if !self.filter.allows(record.status) {
                    continue;
                }
                let atom = Cpv::new(category, package, record.version.clone());
                if !restriction.matches_cpv(&atom) {
                    continue;
                }
                out.push(GitPkgChange {
                    atom,
                    status: record.status,
                    commit: record.commit.clone(),
                    commit_date: record.date,
                    old: record.old.clone(),
                });
            }
        }
        out
    }

    pub fn stream(&self, restriction: &Restriction) -> impl Iterator<Item = Entity> + use<> {
        self.changes(restriction).into_iter().map(Entity::Change)
    }
}
