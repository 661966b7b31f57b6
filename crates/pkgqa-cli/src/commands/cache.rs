use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use pkgqa_addons::{BasicEclassParser, EclassAddon, GitAddon};
use pkgqa_cache::{CacheKind, CacheStore};
use pkgqa_config::PkgqaConfig;
use pkgqa_source::{MemoryRepo, Repository};
use serde::Serialize;

use crate::cli::{CacheCommands, GlobalFlags};
use crate::output::output;
use crate::progress::Progress;

#[derive(Debug, Serialize)]
pub struct RemoveReport {
    pub dry_run: bool,
    pub removed: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct UpdateReport {
    pub repo: PathBuf,
    pub eclasses: usize,
    pub git: usize,
}

/// Handle `pkgqa cache`.
pub fn handle(action: &CacheCommands, config: &PkgqaConfig, flags: &GlobalFlags) -> anyhow::Result<()> {
    let store = CacheStore::new(&config.cache.dir);
    match action {
        CacheCommands::List => output(&list(&store), flags.format),
        CacheCommands::Remove {
            types,
            force,
            dry_run,
        } => output(&remove(&store, types, *force, *dry_run)?, flags.format),
        CacheCommands::Update { repo, force } => {
            let progress = Progress::spinner("updating caches", flags.quiet);
            match update(config, repo, *force || config.cache.force, &progress) {
                Ok(report) => {
                    progress.finish_clear();
                    output(&report, flags.format)
                }
                Err(e) => {
                    progress.finish_err("cache update failed");
                    Err(e)
                }
            }
        }
    }
}

/// Remove the selected cache types, or every type when none is selected.
pub fn remove(
    store: &CacheStore,
    types: &[CacheKind],
    force: bool,
    dry_run: bool,
) -> anyhow::Result<RemoveReport> {
    let selection = if types.is_empty() {
        CacheKind::ALL.to_vec()
    } else {
        types.to_vec()
    };
    let removed = store.remove_caches(&selection, force, dry_run)?;
    Ok(RemoveReport { dry_run, removed })
}

/// Refresh the eclass and git caches of the repository at `location`.
pub fn update(
    config: &PkgqaConfig,
    location: &Path,
    force: bool,
    progress: &Progress,
) -> anyhow::Result<UpdateReport> {
    if !location.is_dir() {
        bail!("repository '{}' is not a directory", location.display());
    }
    let location = location
        .canonicalize()
        .with_context(|| format!("failed resolving repository '{}'", location.display()))?;
    // only the tree location matters to the eclass and git caches
    let trees: Vec<Arc<dyn Repository>> = vec![Arc::new(MemoryRepo::new(&location, []))];
    let store = CacheStore::new(&config.cache.dir);

    progress.set_message("updating eclass cache");
    let mut eclass = EclassAddon::new(store.clone(), config.cache.eclass);
    let eclasses = eclass.update_cache(&trees, &BasicEclassParser, force)?;

    progress.set_message("updating git cache");
    let mut git = GitAddon::new(
        store,
        config.cache.git,
        &config.git.upstream_ref,
        &config.git.local_ref,
    );
    let git = git.update_cache(&trees, force)?;

    tracing::debug!(repo = %location.display(), eclasses, git, "updated caches");
    Ok(UpdateReport {
        repo: location,
        eclasses,
        git,
    })
}

/// Cache files grouped by type, for listing.
#[must_use]
pub fn list(store: &CacheStore) -> BTreeMap<CacheKind, Vec<PathBuf>> {
    store.existing_caches()
}
