use std::path::PathBuf;

use clap::Subcommand;
use pkgqa_cache::CacheKind;

/// Repository cache management.
#[derive(Clone, Debug, Subcommand)]
pub enum CacheCommands {
    /// List cache files on disk, grouped by type.
    List,
    /// Remove cache files.
    Remove {
        /// Cache type to remove (repeatable; all types if omitted).
        #[arg(long = "type", short = 't', value_parser = parse_kind)]
        types: Vec<CacheKind>,
        /// Remove the whole cache directory.
        #[arg(long)]
        force: bool,
        /// Only report what would be removed.
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
    /// Refresh eclass and git caches for a repository.
    Update {
        /// Repository root directory.
        #[arg(long)]
        repo: PathBuf,
        /// Ignore existing caches and regenerate them.
        #[arg(long)]
        force: bool,
    },
}

fn parse_kind(value: &str) -> Result<CacheKind, String> {
    value.parse::<CacheKind>().map_err(|e| e.to_string())
}
