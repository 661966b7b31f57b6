//! Eclass documentation cache.
//!
//! Entries are keyed by eclass name and fingerprinted by file modification
//! time, so one changed eclass is re-parsed without touching the others.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pkgqa_cache::{CacheKind, CacheStore};
use pkgqa_core::Eclass;
use pkgqa_source::{Repository, Source};
use serde::{Deserialize, Serialize};

use crate::cached::{CachedAddon, mtime_ns};
use crate::error::AddonError;

/// Parsed documentation of one eclass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EclassDoc {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub mtime: u64,
    #[serde(default)]
    pub blurb: Option<String>,
    #[serde(default)]
    pub deprecated: bool,
    /// Suggested replacement of a deprecated eclass.
    #[serde(default)]
    pub replacement: Option<String>,
    #[serde(default)]
    pub supported_eapis: Vec<String>,
}

/// Eclass documentation parser collaborator.
pub trait EclassParser: Send + Sync {
    fn parse(&self, name: &str, path: &Path) -> Result<EclassDoc, String>;
}

/// Reads the `@ECLASS`, `@BLURB`, `@DEPRECATED` and `@SUPPORTED_EAPIS` tags.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicEclassParser;

impl EclassParser for BasicEclassParser {
    fn parse(&self, name: &str, path: &Path) -> Result<EclassDoc, String> {
        let text = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
        let mut doc = EclassDoc {
            name: name.to_string(),
            path: path.to_path_buf(),
            mtime: 0,
            blurb: None,
            deprecated: false,
            replacement: None,
            supported_eapis: Vec::new(),
        };
        let mut tagged = false;

        for line in text.lines() {
            let Some(rest) = line.strip_prefix("# @") else {
                continue;
            };
            let (tag, value) = rest.split_once(':').unwrap_or((rest, ""));
            let value = value.trim();
            match tag {
                "ECLASS" => {
                    if value != name && value != format!("{name}.eclass") {
                        return Err(format!("@ECLASS mismatch: expected {name}, got {value}"));
                    }
                    tagged = true;
                }
                "BLURB" => doc.blurb = Some(value.to_string()),
                "DEPRECATED" => {
                    doc.deprecated = true;
                    if !value.is_empty() && value != "none" {
                        doc.replacement = Some(value.to_string());
                    }
                }
                "SUPPORTED_EAPIS" => {
                    doc.supported_eapis = value.split_whitespace().map(str::to_string).collect();
                }
                _ => {}
            }
        }

        if tagged {
            Ok(doc)
        } else {
            Err("missing @ECLASS tag".into())
        }
    }
}

type EclassMap = BTreeMap<String, EclassDoc>;

/// Per-repository eclass caches.
#[derive(Debug)]
pub struct EclassAddon {
    store: CacheStore,
    enabled: bool,
    repos: Vec<(PathBuf, EclassMap)>,
}

impl CachedAddon for EclassAddon {
    const KIND: CacheKind = CacheKind::Eclass;

    fn store(&self) -> &CacheStore {
        &self.store
    }
}

impl EclassAddon {
    #[must_use]
    pub const fn new(store: CacheStore, enabled: bool) -> Self {
        Self {
            store,
            enabled,
            repos: Vec::new(),
        }
    }

    /// Refresh each tree's eclass cache and persist it if anything changed.
    ///
    /// Returns the number of eclasses (re)parsed.
    pub fn update_cache(
        &mut self,
        trees: &[Arc<dyn Repository>],
        parser: &dyn EclassParser,
        force: bool,
    ) -> Result<usize, AddonError> {
        if !self.enabled {
            return Ok(0);
        }

        let mut parsed = 0;
        for repo in trees {
            let cache_file = self.cache_file(repo.repo_id());
            let mut eclasses: EclassMap = if force {
                EclassMap::new()
            } else {
                self.load_cache(&cache_file, EclassMap::new())
            };
            let mut changed = false;

            let before = eclasses.len();
            eclasses.retain(|_, doc| doc.path.exists());
            changed |= eclasses.len() != before;

            for (name, path) in repo_eclasses(repo.location())? {
                let Ok(meta) = std::fs::metadata(&path) else {
                    continue;
                };
                let mtime = mtime_ns(&meta);
                if eclasses.get(&name).is_some_and(|doc| doc.mtime == mtime) {
                    continue;
                }
                tracing::debug!(repo = %repo.location().display(), eclass = %name, "updating eclass cache");
                match parser.parse(&name, &path) {
                    Ok(mut doc) => {
                        doc.mtime = mtime;
                        eclasses.insert(name, doc);
                        parsed += 1;
                        changed = true;
                    }
                    Err(e) => {
                        tracing::debug!(eclass = %name, error = %e, "skipping unparsable eclass");
                    }
                }
            }

            if changed {
                self.save_cache(&eclasses, &cache_file)?;
            }

            let location = repo.location().to_path_buf();
            self.repos.retain(|(loc, _)| *loc != location);
            self.repos.push((location, eclasses));
        }
        Ok(parsed)
    }

    /// Eclasses across all trees; later trees override earlier ones.
    #[must_use]
    pub fn eclasses(&self) -> EclassMap {
        let mut merged = EclassMap::new();
        for (_, eclasses) in &self.repos {
            merged.extend(eclasses.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged
    }

    /// Deprecated eclasses mapped to their replacement, if any.
    #[must_use]
    pub fn deprecated(&self) -> BTreeMap<String, Option<String>> {
        self.eclasses()
            .into_iter()
            .filter(|(_, doc)| doc.deprecated)
            .map(|(name, doc)| (name, doc.replacement))
            .collect()
    }

    /// Eclass-scope source over the cached eclasses.
    #[must_use]
    pub fn source(&self) -> Source {
        let entities: BTreeMap<String, Eclass> = self
            .eclasses()
            .into_iter()
            .map(|(name, doc)| {
                let eclass = Eclass::new(name.clone(), &doc.path);
                (name, eclass)
            })
            .collect();
        Source::eclasses(entities)
    }
}

fn repo_eclasses(location: &Path) -> Result<Vec<(String, PathBuf)>, AddonError> {
    let dir = location.join("eclass");
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(AddonError::Io { path: dir, source }),
    };
    let mut eclasses: Vec<(String, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let file_name = entry.file_name();
            let name = file_name.to_str()?.strip_suffix(".eclass")?.to_string();
            Some((name, entry.path()))
        })
        .collect();
    eclasses.sort();
    Ok(eclasses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_tags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.eclass");
        std::fs::write(
            &path,
            "# @ECLASS: old.eclass\n# @BLURB: legacy helpers\n# @DEPRECATED: new\n# @SUPPORTED_EAPIS: 7 8\n",
        )
        .unwrap();
        let doc = BasicEclassParser.parse("old", &path).unwrap();
        assert_eq!(doc.blurb.as_deref(), Some("legacy helpers"));
        assert!(doc.deprecated);
        assert_eq!(doc.replacement.as_deref(), Some("new"));
        assert_eq!(doc.supported_eapis, ["7", "8"]);
    }

    #[test]
    fn deprecated_without_replacement() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.eclass");
        std::fs::write(&path, "# @ECLASS: gone.eclass\n# @DEPRECATED: none\n").unwrap();
        let doc = BasicEclassParser.parse("gone", &path).unwrap();
        assert!(doc.deprecated);
        assert_eq!(doc.replacement, None);
    }

    #[test]
    fn untagged_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.eclass");
        std::fs::write(&path, "inherit foo\n").unwrap();
        assert!(BasicEclassParser.parse("x", &path).is_err());
        std::fs::write(&path, "# @ECLASS: y.eclass\n").unwrap();
        assert!(BasicEclassParser.parse("x", &path).is_err());
    }
}
