//! # pkgqa-addons
//!
//! Derived repository data persisted across scans:
//! - Profile records fingerprinted by the files of their inheritance stack
//! - Eclass documentation fingerprinted per file
//! - Package history extended incrementally from the last cached commit
//!
//! Also holds the git helpers commit-scope scans need: log parsing, staged
//! change targets, and gitignore matching.

pub mod eclass;
pub mod git;
pub mod profiles;

mod cached;
mod error;

pub use cached::CachedAddon;
pub use eclass::{BasicEclassParser, EclassAddon, EclassDoc, EclassParser};
pub use error::AddonError;
pub use git::{GitAddon, GitCache, GitIgnore, HistoryRepo, StatusFilter};
pub use profiles::{
    Fingerprint, ProfileAddon, ProfileData, ProfileEvaluator, ProfileRecord, ProfileSpec,
    ProfileTree, ProfileUpdate,
};
