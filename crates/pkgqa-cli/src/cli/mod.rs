use clap::{Parser, Subcommand};

pub mod cache;
pub mod global;

pub use cache::CacheCommands;
pub use global::{GlobalFlags, OutputFormat};

/// Top-level CLI parser for the `pkgqa` binary.
#[derive(Debug, Parser)]
#[command(name = "pkgqa", version, about = "pkgqa - package repository QA scanner")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: json, raw
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage repository caches.
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },
}

impl Cli {
    #[must_use]
    pub const fn global_flags(&self) -> GlobalFlags {
        GlobalFlags {
            format: self.format,
            quiet: self.quiet,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use clap::{CommandFactory, Parser};
    use pkgqa_cache::CacheKind;

    use super::{CacheCommands, Cli, Commands, OutputFormat};

    #[test]
    fn clap_command_tree_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["pkgqa", "cache", "list", "--format", "raw", "--quiet"])
            .expect("cli should parse");

        assert_eq!(cli.format, OutputFormat::Raw);
        assert!(cli.quiet);
        assert!(matches!(
            cli.command,
            Commands::Cache {
                action: CacheCommands::List
            }
        ));
    }

    #[test]
    fn remove_collects_repeated_types() {
        let cli = Cli::try_parse_from([
            "pkgqa", "cache", "remove", "--type", "git", "-t", "eclass", "--dry-run",
        ])
        .expect("cli should parse");

        let Commands::Cache {
            action: CacheCommands::Remove { types, force, dry_run },
        } = cli.command
        else {
            panic!("expected cache remove");
        };
        assert_eq!(types, [CacheKind::Git, CacheKind::Eclass]);
        assert!(!force);
        assert!(dry_run);
    }

    #[test]
    fn remove_rejects_unknown_type() {
        assert!(Cli::try_parse_from(["pkgqa", "cache", "remove", "--type", "pickle"]).is_err());
    }

    #[test]
    fn update_requires_repo() {
        assert!(Cli::try_parse_from(["pkgqa", "cache", "update"]).is_err());
        let cli = Cli::try_parse_from(["pkgqa", "cache", "update", "--repo", "/srv/gentoo", "--force"])
            .expect("cli should parse");
        let Commands::Cache {
            action: CacheCommands::Update { repo, force },
        } = cli.command
        else {
            panic!("expected cache update");
        };
        assert_eq!(repo, Path::new("/srv/gentoo"));
        assert!(force);
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["pkgqa", "-q", "-v", "cache", "list"]).is_err());
    }
}
