//! # pkgqa-cache
//!
//! Versioned, repository-scoped cache files.
//!
//! Each cache type is registered once in [`CacheKind`] with a file name and a
//! version. A file stored under another version is treated as absent and
//! removed; bumping the version is the only migration.

mod error;
mod kind;
mod store;

pub use error::CacheError;
pub use kind::{CacheKind, CacheSpec};
pub use store::CacheStore;
