//! Profile evaluation cache.
//!
//! Each profile is fingerprinted by the newest modification time and the set
//! of regular files across its inheritance stack. A cached record is reused
//! only when its stored fingerprint matches the fresh one; otherwise the
//! evaluator runs again and the entry is replaced.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pkgqa_cache::{CacheKind, CacheStore};
use pkgqa_core::ProtectedSet;
use pkgqa_source::Repository;
use serde::{Deserialize, Serialize};

use crate::cached::{CachedAddon, mtime_ns};
use crate::error::AddonError;

/// A profile as configured for one architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSpec {
    /// Path relative to the profiles directory, e.g. `default/linux/amd64/23.0`.
    pub path: String,
    pub arch: String,
    pub status: String,
    pub deprecated: bool,
    /// Directories of the inheritance stack, parents first.
    pub stack: Vec<PathBuf>,
}

/// Derived profile data produced by the evaluator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    #[serde(default)]
    pub masks: BTreeSet<String>,
    #[serde(default)]
    pub unmasks: BTreeSet<String>,
    #[serde(default)]
    pub masked_use: BTreeSet<String>,
    #[serde(default)]
    pub stable_masked_use: BTreeSet<String>,
    #[serde(default)]
    pub forced_use: BTreeSet<String>,
    #[serde(default)]
    pub stable_forced_use: BTreeSet<String>,
    #[serde(default)]
    pub pkg_use: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub iuse_effective: BTreeSet<String>,
    #[serde(default, rename = "use")]
    pub use_flags: BTreeSet<String>,
    #[serde(default)]
    pub provides: BTreeSet<String>,
}

/// Profile evaluation collaborator; owns the mask and USE algebra.
pub trait ProfileEvaluator: Send + Sync {
    fn evaluate(&self, profile: &ProfileSpec) -> Result<ProfileRecord, String>;
}

/// Cache validity data for one profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub mtime: u64,
    pub files: BTreeSet<PathBuf>,
}

/// Computes fingerprints, listing each stack directory once.
#[derive(Debug, Default)]
pub struct Fingerprinter {
    nodes: HashMap<PathBuf, (u64, Vec<PathBuf>)>,
}

impl Fingerprinter {
    pub fn fingerprint(&mut self, profile: &ProfileSpec) -> Result<Fingerprint, AddonError> {
        let mut fingerprint = Fingerprint {
            mtime: 0,
            files: BTreeSet::new(),
        };
        for node in &profile.stack {
            if !self.nodes.contains_key(node) {
                let listing = list_node(node)?;
                self.nodes.insert(node.clone(), listing);
            }
            if let Some((mtime, files)) = self.nodes.get(node) {
                fingerprint.mtime = fingerprint.mtime.max(*mtime);
                fingerprint.files.extend(files.iter().cloned());
            }
        }
        Ok(fingerprint)
    }

    /// Number of distinct stack directories listed so far.
    #[must_use]
    pub fn nodes_listed(&self) -> usize {
        self.nodes.len()
    }
}

fn list_node(node: &Path) -> Result<(u64, Vec<PathBuf>), AddonError> {
    let io_err = |source| AddonError::Io {
        path: node.to_path_buf(),
        source,
    };
    let mut mtime = 0;
    let mut files = Vec::new();
    for entry in std::fs::read_dir(node).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let meta = std::fs::symlink_metadata(entry.path()).map_err(io_err)?;
        if meta.is_file() {
            mtime = mtime.max(mtime_ns(&meta));
            files.push(entry.path());
        }
    }
    Ok((mtime, files))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedProfile {
    fingerprint: Fingerprint,
    record: ProfileRecord,
}

type ProfileCache = BTreeMap<String, CachedProfile>;

/// Profiles of one repository tree.
#[derive(Debug, Clone)]
pub struct ProfileTree {
    pub repo: Arc<dyn Repository>,
    pub known_arches: BTreeSet<String>,
    pub profiles: Vec<ProfileSpec>,
}

/// Profile view for one keyword (`arch` or `~arch`).
///
/// Stable and unstable views of a profile share lookup state: the stable
/// lookup cache is readable from the unstable view but not the reverse, and
/// the unstable insoluble set is readable from the stable view but not the
/// reverse. Every unstable insoluble set overlays one global set.
#[derive(Debug)]
pub struct ProfileData {
    pub name: String,
    pub key: String,
    pub status: String,
    pub deprecated: bool,
    pub record: Arc<ProfileRecord>,
    pub masked_use: BTreeSet<String>,
    pub forced_use: BTreeSet<String>,
    pub cache: Arc<ProtectedSet<String>>,
    pub insoluble: Arc<ProtectedSet<String>>,
}

/// Outcome of a profile cache update.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub evaluated: Vec<String>,
    pub reused: Vec<String>,
    pub skipped: Vec<String>,
}

fn empty_set() -> Arc<ProtectedSet<String>> {
    Arc::new(ProtectedSet::<String>::new(Arc::new(HashSet::<String>::new())))
}

#[derive(Debug)]
pub struct ProfileAddon {
    store: CacheStore,
    enabled: bool,
    arches: Option<BTreeSet<String>>,
    global_insoluble: Arc<ProtectedSet<String>>,
    filters: BTreeMap<String, Vec<Arc<ProfileData>>>,
    groups: BTreeMap<String, Vec<Vec<Arc<ProfileData>>>>,
}

impl CachedAddon for ProfileAddon {
    const KIND: CacheKind = CacheKind::Profiles;

    fn store(&self) -> &CacheStore {
        &self.store
    }
}

impl ProfileAddon {
    #[must_use]
    pub fn new(store: CacheStore, enabled: bool) -> Self {
        Self {
            store,
            enabled,
            arches: None,
            global_insoluble: empty_set(),
            filters: BTreeMap::new(),
            groups: BTreeMap::new(),
        }
    }

    /// Restrict evaluation to the given arches.
    #[must_use]
    pub fn with_arches<I, S>(mut self, arches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arches = Some(arches.into_iter().map(Into::into).collect());
        self
    }

    /// Evaluate or reuse every profile and rebuild the per-keyword views.
    pub fn update_cache(
        &mut self,
        trees: &[ProfileTree],
        evaluator: &dyn ProfileEvaluator,
        force: bool,
    ) -> Result<ProfileUpdate, AddonError> {
        let mut update = ProfileUpdate::default();
        let mut fingerprinter = Fingerprinter::default();
        self.filters.clear();
        self.global_insoluble = empty_set();

        for tree in trees {
            let cache_file = self.cache_file(tree.repo.repo_id());
            let mut cache: ProfileCache = if self.enabled && !force {
                self.load_cache(&cache_file, ProfileCache::new())
            } else {
                ProfileCache::new()
            };
            let mut dirty = false;

            let arches: Vec<&String> = tree
                .known_arches
                .iter()
                .filter(|arch| self.arches.as_ref().is_none_or(|sel| sel.contains(*arch)))
                .collect();

            for arch in arches {
                for profile in tree.profiles.iter().filter(|p| p.arch == *arch) {
                    let fingerprint = if self.enabled {
                        match fingerprinter.fingerprint(profile) {
                            Ok(fp) => Some(fp),
                            Err(e) => {
                                tracing::warn!(profile = %profile.path, error = %e, "skipping unreadable profile");
                                update.skipped.push(profile.path.clone());
                                continue;
                            }
                        }
                    } else {
                        None
                    };

                    let cached = cache
                        .get(&profile.path)
                        .filter(|entry| Some(&entry.fingerprint) == fingerprint.as_ref());
                    let record = if let Some(entry) = cached {
                        update.reused.push(profile.path.clone());
                        entry.record.clone()
                    } else {
                        tracing::debug!(
                            repo = %tree.repo.location().display(),
                            arch = %arch,
                            profile = %profile.path,
                            "updating profiles cache"
                        );
                        match evaluator.evaluate(profile) {
                            Ok(record) => {
                                update.evaluated.push(profile.path.clone());
                                if let Some(fingerprint) = fingerprint {
                                    cache.insert(
                                        profile.path.clone(),
                                        CachedProfile {
                                            fingerprint,
                                            record: record.clone(),
                                        },
                                    );
                                    dirty = true;
                                }
                                record
                            }
                            Err(e) => {
                                tracing::debug!(profile = %profile.path, error = %e, "skipping profile");
                                update.skipped.push(profile.path.clone());
                                continue;
                            }
                        }
                    };
                    self.push_views(profile, arch, &tree.known_arches, record);
                }
            }

            if dirty {
                self.save_cache(&cache, &cache_file)?;
            }
        }

        self.rebuild_groups();
        Ok(update)
    }

    fn push_views(
        &mut self,
        profile: &ProfileSpec,
        arch: &str,
        known_arches: &BTreeSet<String>,
        record: ProfileRecord,
    ) {
        let stable_key = arch.trim_start_matches('~').to_string();
        let unstable_key = format!("~{stable_key}");
        let other_arches = known_arches.iter().filter(|a| **a != stable_key).cloned();

        let masked = |base: &BTreeSet<String>| -> BTreeSet<String> {
            base.iter().cloned().chain(other_arches.clone()).collect()
        };
        let forced = |base: &BTreeSet<String>| -> BTreeSet<String> {
            let mut set = base.clone();
            set.insert(stable_key.clone());
            set
        };

        let stable_cache = empty_set();
        let unstable_insoluble = Arc::new(ProtectedSet::<String>::new(self.global_insoluble.clone()));
        let record = Arc::new(record);

        let stable = ProfileData {
            name: profile.path.clone(),
            key: stable_key.clone(),
            status: profile.status.clone(),
            deprecated: profile.deprecated,
            masked_use: masked(&record.stable_masked_use),
            forced_use: forced(&record.stable_forced_use),
            record: record.clone(),
            cache: stable_cache.clone(),
            insoluble: Arc::new(ProtectedSet::<String>::new(unstable_insoluble.clone())),
        };
        let unstable = ProfileData {
            name: profile.path.clone(),
            key: unstable_key.clone(),
            status: profile.status.clone(),
            deprecated: profile.deprecated,
            masked_use: masked(&record.masked_use),
            forced_use: forced(&record.forced_use),
            record,
            cache: Arc::new(ProtectedSet::<String>::new(stable_cache)),
            insoluble: unstable_insoluble,
        };

        self.filters.entry(stable_key).or_default().push(Arc::new(stable));
        self.filters.entry(unstable_key).or_default().push(Arc::new(unstable));
    }

    fn rebuild_groups(&mut self) {
        self.groups.clear();
        for (key, profiles) in &self.filters {
            let mut similar: Vec<Vec<Arc<ProfileData>>> = Vec::new();
            for profile in profiles {
                let existing = similar.iter_mut().find(|group| {
                    group[0].masked_use == profile.masked_use
                        && group[0].forced_use == profile.forced_use
                });
                match existing {
                    Some(group) => group.push(profile.clone()),
                    None => similar.push(vec![profile.clone()]),
                }
            }
            self.groups.insert(key.clone(), similar);
        }
    }

    /// Profiles for a keyword.
    #[must_use]
    pub fn get(&self, key: &str) -> &[Arc<ProfileData>] {
        self.filters.get(key).map_or(&[], Vec::as_slice)
    }

    /// Profiles for a keyword grouped by identical masked and forced USE,
    /// so USE processing can be shared within a group.
    #[must_use]
    pub fn evaluate_groups(&self, key: &str) -> &[Vec<Arc<ProfileData>>] {
        self.groups.get(key).map_or(&[], Vec::as_slice)
    }

    /// Shared insoluble set overlaid by every unstable view.
    #[must_use]
    pub fn global_insoluble(&self) -> &Arc<ProtectedSet<String>> {
        &self.global_insoluble
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ProfileData>> {
        self.filters.values().flatten()
    }
}
