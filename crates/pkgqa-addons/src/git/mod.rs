//! Git history support.
//!
//! Commit ids are resolved in-process with `gix`; log and diff output comes
//! from the `git` binary, which the addon requires for any history work.

mod history;
mod ignore;
mod log;

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use pkgqa_cache::{CacheKind, CacheStore};
use pkgqa_core::{GitCommit, GitPkgChange, PackageKey, Restriction, Scope};
use pkgqa_source::{Repository, Source};

use crate::cached::CachedAddon;
use crate::error::AddonError;

pub use history::{GitCache, HistoryData, HistoryRecord, HistoryRepo, StatusFilter, fold_changes};
pub use ignore::GitIgnore;
pub use log::{FileChange, ebuild_cpv, parse_change_line, parse_commits, parse_pkg_changes};

const LOG_CMD: &[&str] = &["log", "--name-status", "--date=short", "--diff-filter=ARMD"];

/// Whether a usable `git` binary is on `PATH`.
#[must_use]
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|out| out.status.success())
}

fn run_git<I, S>(cwd: &Path, args: I) -> Result<String, AddonError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|e| AddonError::Git(format!("failed running git: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let first = stderr.lines().next().unwrap_or("unknown error");
        return Err(AddonError::Git(format!("failed running git: {first}")));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn log_output(path: &Path, format: &[&str], range: &str) -> Result<String, AddonError> {
    let mut args: Vec<String> = LOG_CMD.iter().map(|s| (*s).to_string()).collect();
    args.push(format!("--pretty=tformat:{}", format.join("%n")));
    args.push(range.to_string());
    run_git(path, args)
}

/// Full commit id that `reference` resolves to in the repository at `path`.
pub fn resolve_commit(path: &Path, reference: &str) -> Result<String, AddonError> {
    let failed = |e: &dyn std::fmt::Display| {
        AddonError::Git(format!(
            "failed retrieving commit hash for git repo: {}: {e}",
            path.display()
        ))
    };
    let repo = gix::open(path).map_err(|e| failed(&e))?;
    let id = repo.rev_parse_single(reference).map_err(|e| failed(&e))?;
    Ok(id.detach().to_string())
}

/// Package changes over `range`, newest first.
pub fn pkg_changes(path: &Path, range: &str, local: bool) -> Result<Vec<GitPkgChange>, AddonError> {
    let output = log_output(path, log::PKG_FORMAT, range)?;
    parse_pkg_changes(output.lines(), local)
}

/// Create or extend historical package data for `range`.
pub fn pkg_history(
    path: &Path,
    range: &str,
    data: &mut HistoryData,
    local: bool,
) -> Result<(), AddonError> {
    fold_changes(pkg_changes(path, range, local)?, data);
    Ok(())
}

/// Commits over `range`, newest first.
pub fn commit_log(path: &Path, range: &str) -> Result<Vec<GitCommit>, AddonError> {
    let output = log_output(path, log::COMMIT_FORMAT, range)?;
    parse_commits(output.lines())
}

/// Top-level directories that never hold packages.
const NON_CATEGORY_DIRS: &[&str] = &["eclass", "licenses", "metadata", "profiles", "scripts"];

/// Category directories of the repository at `location`.
///
/// Uses `profiles/categories` when present, else every visible top-level
/// directory that is not a known non-category directory.
pub fn category_dirs(location: &Path) -> Result<Vec<String>, AddonError> {
    let listed = location.join("profiles/categories");
    let mut categories: Vec<String> = match std::fs::read_to_string(&listed) {
        Ok(text) => text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let entries = std::fs::read_dir(location).map_err(|source| AddonError::Io {
                path: location.to_path_buf(),
                source,
            })?;
            entries
                .flatten()
                .filter(|entry| entry.path().is_dir())
                .filter_map(|entry| entry.file_name().into_string().ok())
                .filter(|name| !name.starts_with('.') && !NON_CATEGORY_DIRS.contains(&name.as_str()))
                .collect()
        }
        Err(source) => return Err(AddonError::Io { path: listed, source }),
    };
    categories.retain(|cat| location.join(cat).is_dir());
    categories.sort();
    categories.dedup();
    Ok(categories)
}

fn eclass_name(path: &str) -> Option<&str> {
    let name = path.strip_prefix("eclass/")?.strip_suffix(".eclass")?;
    (!name.is_empty() && !name.contains(|c: char| c.is_whitespace() || c == '/')).then_some(name)
}

fn package_key(path: &str) -> Option<PackageKey> {
    let mut parts = path.splitn(3, '/');
    let (category, package) = (parts.next()?, parts.next()?);
    format!("{category}/{package}").parse().ok()
}

/// Scan targets for the changes staged against `reference`.
///
/// Package paths become one package-scope restriction over their package
/// keys; `eclass/*.eclass` paths become one eclass-scope restriction. An
/// empty result means there is nothing to scan.
pub fn changed_targets(location: &Path, reference: &str) -> Result<Vec<(Scope, Restriction)>, AddonError> {
    let mut paths = category_dirs(location)?;
    if location.join("eclass").is_dir() {
        paths.push("eclass".into());
    }
    if paths.is_empty() {
        return Ok(Vec::new());
    }
    let mut args: Vec<String> = vec![
        "diff".into(),
        "--cached".into(),
        reference.into(),
        "--name-only".into(),
        "--".into(),
    ];
    args.extend(paths);
    let output = run_git(location, args)?;

    let mut pkgs: Vec<PackageKey> = Vec::new();
    let mut eclasses: Vec<String> = Vec::new();
    for line in output.lines() {
        if line.starts_with("eclass/") {
            eclasses.extend(eclass_name(line).map(str::to_string));
        } else {
            pkgs.extend(package_key(line));
        }
    }
    pkgs.sort();
    pkgs.dedup();

    let mut targets = Vec::new();
    if !pkgs.is_empty() {
        let restriction = Restriction::Or(pkgs.into_iter().map(Restriction::Package).collect());
        targets.push((Scope::Package, restriction));
    }
    if !eclasses.is_empty() {
        targets.push((Scope::Eclass, Restriction::eclasses(eclasses)));
    }
    Ok(targets)
}

/// Historical package data cached per repository.
#[derive(Debug)]
pub struct GitAddon {
    store: CacheStore,
    enabled: bool,
    upstream_ref: String,
    local_ref: String,
    cached: BTreeMap<PathBuf, GitCache>,
}

impl CachedAddon for GitAddon {
    const KIND: CacheKind = CacheKind::Git;

    fn store(&self) -> &CacheStore {
        &self.store
    }
}

impl GitAddon {
    /// Create the addon; it disables itself when `git` is unavailable.
    #[must_use]
    pub fn new(
        store: CacheStore,
        enabled: bool,
        upstream_ref: impl Into<String>,
        local_ref: impl Into<String>,
    ) -> Self {
        let enabled = enabled && {
            let found = git_available();
            if !found {
                tracing::warn!("git not found, disabling git support");
            }
            found
        };
        Self {
            store,
            enabled,
            upstream_ref: upstream_ref.into(),
            local_ref: local_ref.into(),
            cached: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Extend each tree's history cache up to its upstream commit.
    ///
    /// Trees whose upstream ref cannot be resolved are skipped. Returns the
    /// number of trees whose cache was rebuilt or extended.
    pub fn update_cache(
        &mut self,
        trees: &[Arc<dyn Repository>],
        force: bool,
    ) -> Result<usize, AddonError> {
        if !self.enabled {
            return Ok(0);
        }

        let mut updated = 0;
        for repo in trees {
            let location = repo.location();
            let commit = match resolve_commit(location, &self.upstream_ref) {
                Ok(commit) => commit,
                Err(e) => {
                    tracing::debug!(repo = %location.display(), error = %e, "skipping git cache");
                    continue;
                }
            };

            let cache_file = self.cache_file(repo.repo_id());
            let cached: Option<GitCache> = if force {
                None
            } else {
                self.load_cache(&cache_file, None)
            };

            let git_cache = match cached {
                Some(cache) if cache.commit == commit => cache,
                cached => {
                    let short = commit.get(..13).unwrap_or(&commit);
                    tracing::debug!(repo = %location.display(), commit = short, "updating git repo cache");
                    let (mut data, range) = match cached {
                        Some(cache) => (cache.data, format!("{}..{}", cache.commit, self.upstream_ref)),
                        None => (HistoryData::new(), self.upstream_ref.clone()),
                    };
                    pkg_history(location, &range, &mut data, false)?;
                    let cache = GitCache { commit, data };
                    self.save_cache(&cache, &cache_file)?;
                    updated += 1;
                    cache
                }
            };
            self.cached.insert(location.to_path_buf(), git_cache);
        }
        Ok(updated)
    }

    /// History view over all trees, or `None` when any tree lacks history.
    #[must_use]
    pub fn cached_repo(
        &self,
        trees: &[Arc<dyn Repository>],
        filter: StatusFilter,
    ) -> Option<HistoryRepo> {
        if !self.enabled {
            return None;
        }
        let mut data = HistoryData::new();
        for repo in trees {
            let cache = self.cached.get(repo.location())?;
            for (key, records) in &cache.data {
                data.entry(key.clone())
                    .or_default()
                    .extend(records.iter().cloned());
            }
        }
        let first = trees.first()?;
        Some(HistoryRepo::new(suffixed(first.repo_id(), "-history"), data, filter))
    }

    fn local_range(&self, repo: &dyn Repository) -> Result<Option<String>, AddonError> {
        let upstream = resolve_commit(repo.location(), &self.upstream_ref)?;
        let local = resolve_commit(repo.location(), &self.local_ref)?;
        Ok((upstream != local).then(|| format!("{}..{}", self.upstream_ref, self.local_ref)))
    }

    /// Package changes made by local commits not yet upstream.
    pub fn commits_repo(&self, repo: &dyn Repository) -> Result<HistoryRepo, AddonError> {
        let mut data = HistoryData::new();
        let range = if self.enabled { self.local_range(repo)? } else { None };
        if let Some(range) = range {
            pkg_history(repo.location(), &range, &mut data, true)?;
        }
        Ok(HistoryRepo::new(
            suffixed(repo.repo_id(), "-commits"),
            data,
            StatusFilter::Changed,
        ))
    }

    /// Local commits not yet upstream, newest first.
    pub fn commits(&self, repo: &dyn Repository) -> Result<Vec<GitCommit>, AddonError> {
        if !self.enabled {
            return Ok(Vec::new());
        }
        match self.local_range(repo)? {
            Some(range) => commit_log(repo.location(), &range),
            None => Ok(Vec::new()),
        }
    }

    /// Commit-scope source over the local commits.
    pub fn commits_source(&self, repo: &dyn Repository) -> Result<Source, AddonError> {
        Ok(Source::commits(self.commits(repo)?))
    }
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut id = OsString::from(path.as_os_str());
    id.push(suffix);
    PathBuf::from(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffixed_ids() {
        assert_eq!(suffixed(Path::new("/repos/gentoo"), "-history"), Path::new("/repos/gentoo-history"));
    }

    #[test]
    fn staged_path_parsing() {
        assert_eq!(eclass_name("eclass/foo.eclass"), Some("foo"));
        assert_eq!(eclass_name("eclass/tests/foo.eclass"), None);
        assert_eq!(eclass_name("eclass/README"), None);
        assert_eq!(package_key("cat/a/a-1.ebuild"), Some(PackageKey::new("cat", "a")));
        assert_eq!(package_key("cat/a/files/x.patch"), Some(PackageKey::new("cat", "a")));
        assert_eq!(package_key("cat"), None);
    }

    #[test]
    fn categories_from_listing_or_layout() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for d in ["dev-libs", "app-misc", "eclass", "profiles", "metadata", ".git"] {
            std::fs::create_dir_all(root.join(d)).unwrap();
        }
        assert_eq!(category_dirs(root).unwrap(), ["app-misc", "dev-libs"]);

        std::fs::write(root.join("profiles/categories"), "dev-libs\nmissing-cat\n").unwrap();
        assert_eq!(category_dirs(root).unwrap(), ["dev-libs"]);
    }

    #[test]
    fn disabled_addon_is_inert() {
        let dir = tempfile::tempdir().unwrap();
        let mut addon = GitAddon::new(CacheStore::new(dir.path()), false, "origin/HEAD", "master");
        assert!(!addon.is_enabled());
        assert_eq!(addon.update_cache(&[], false).unwrap(), 0);
        assert!(addon.cached_repo(&[], StatusFilter::Changed).is_none());
    }
}
