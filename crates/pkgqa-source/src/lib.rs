//! # pkgqa-source
//!
//! Lazy, restriction-filtered entity streams.
//!
//! Sources wrap a [`Repository`] and compose by explicit wrapping: latest-slot
//! reduction, content injection, grouping into package or category lists, and
//! identity enumeration for the scheduler.

mod filters;
mod repo;
mod source;

pub use filters::{GroupAdjacent, GroupKey, LatestSlots, dedup_adjacent};
pub use repo::{MemoryRepo, Repository};
pub use source::{EntityIter, Source};
