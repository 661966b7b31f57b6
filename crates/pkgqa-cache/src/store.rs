//! Load and save of versioned cache files.
//!
//! A cache file is a JSON envelope `{"kind", "version", "data"}`. The header is
//! decoded first so a stale file is rejected without decoding its payload.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use ignore::WalkBuilder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::{CacheError, CacheKind, CacheSpec};

#[derive(Serialize)]
struct Envelope<'a, T> {
    kind: CacheKind,
    version: u32,
    data: &'a T,
}

#[derive(Deserialize)]
struct Header {
    kind: CacheKind,
    version: u32,
}

#[derive(Deserialize)]
struct Body<T> {
    data: T,
}

/// Cache files rooted at one directory, one subtree per repository.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of `kind`'s cache for the repository at `repo_id`.
    ///
    /// Root and parent components of the id are dropped so the file always
    /// lands under `<root>/repos`.
    #[must_use]
    pub fn cache_file(&self, kind: CacheKind, repo_id: &Path) -> PathBuf {
        let mut path = self.root.join("repos");
        path.extend(repo_id.components().filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        }));
        path.push(kind.spec().file);
        path
    }

    /// Load a payload, or return `fallback` if the file is missing, corrupt
    /// or written under another version. Stale and corrupt files are removed.
    pub fn load<T: DeserializeOwned>(&self, spec: CacheSpec, path: &Path, fallback: T) -> T {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return fallback,
            Err(e) => {
                tracing::warn!(cache = %spec.kind, path = %path.display(), error = %e, "failed reading cache");
                return fallback;
            }
        };

        match serde_json::from_slice::<Header>(&bytes) {
            Ok(header) if header.kind == spec.kind && header.version == spec.version => {}
            Ok(header) => {
                tracing::debug!(
                    cache = %spec.kind,
                    stored = header.version,
                    expected = spec.version,
                    "forcing cache regen due to outdated version"
                );
                discard(path);
                return fallback;
            }
            Err(e) => {
                tracing::debug!(cache = %spec.kind, error = %e, "forcing cache regen due to decode failure");
                discard(path);
                return fallback;
            }
        }

        match serde_json::from_slice::<Body<T>>(&bytes) {
            Ok(body) => body.data,
            Err(e) => {
                tracing::debug!(cache = %spec.kind, error = %e, "forcing cache regen due to decode failure");
                discard(path);
                fallback
            }
        }
    }

    /// Atomically write a payload, creating parent directories as needed.
    pub fn save<T: Serialize>(
        &self,
        spec: CacheSpec,
        payload: &T,
        path: &Path,
    ) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(&Envelope {
            kind: spec.kind,
            version: spec.version,
            data: payload,
        })
        .map_err(|source| CacheError::Encode {
            kind: spec.kind,
            source,
        })?;

        let save_err = |source| CacheError::Save {
            kind: spec.kind,
            path: path.to_path_buf(),
            source,
        };
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(save_err)?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(save_err)?;
        tmp.write_all(&bytes).map_err(save_err)?;
        tmp.as_file().sync_all().map_err(save_err)?;
        tmp.persist(path).map_err(|e| save_err(e.error))?;

        tracing::debug!(cache = %spec.kind, path = %path.display(), "saved cache");
        Ok(())
    }

    /// All cache files on disk, grouped by type and sorted.
    #[must_use]
    pub fn existing_caches(&self) -> BTreeMap<CacheKind, Vec<PathBuf>> {
        let mut caches: BTreeMap<CacheKind, Vec<PathBuf>> = BTreeMap::new();
        let repos = self.root.join("repos");
        if !repos.is_dir() {
            return caches;
        }

        let walker = WalkBuilder::new(&repos).standard_filters(false).build();
        for entry in walker.flatten() {
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let Some(kind) = entry.file_name().to_str().and_then(CacheKind::from_file_name) else {
                continue;
            };
            caches.entry(kind).or_default().push(entry.into_path());
        }
        for paths in caches.values_mut() {
            paths.sort();
        }
        caches
    }

    /// Remove cache files.
    ///
    /// With `force` the whole cache root goes. Otherwise only files of the
    /// selected kinds are removed and emptied directories are pruned up to
    /// the root. `dry_run` reports without touching the disk. Returns the
    /// affected paths.
    pub fn remove_caches(
        &self,
        selection: &[CacheKind],
        force: bool,
        dry_run: bool,
    ) -> Result<Vec<PathBuf>, CacheError> {
        if force {
            if !dry_run {
                match std::fs::remove_dir_all(&self.root) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(source) => {
                        return Err(CacheError::Remove {
                            path: self.root.clone(),
                            source,
                        });
                    }
                }
            }
            return Ok(vec![self.root.clone()]);
        }

        let mut removed = Vec::new();
        for (kind, paths) in self.existing_caches() {
            if !selection.contains(&kind) {
                continue;
            }
            for path in paths {
                if !dry_run {
                    std::fs::remove_file(&path).map_err(|source| CacheError::Remove {
                        path: path.clone(),
                        source,
                    })?;
                    self.prune_empty_parents(&path);
                }
                removed.push(path);
            }
        }
        Ok(removed)
    }

    fn prune_empty_parents(&self, path: &Path) {
        for dir in path.ancestors().skip(1) {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            // fails once a directory still has entries
            if std::fs::remove_dir(dir).is_err() {
                break;
            }
        }
    }
}

fn discard(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed removing stale cache");
    }
}
