//! Membership containers shared between profile lookups.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;

/// Read-only membership test.
pub trait Contains<T> {
    fn contains(&self, item: &T) -> bool;
}

impl<T: Eq + Hash> Contains<T> for HashSet<T> {
    fn contains(&self, item: &T) -> bool {
        Self::contains(self, item)
    }
}

/// A write-on-top overlay over a shared, never-mutated base set.
///
/// Lookups check the overlay then the base. Inserts only touch the overlay,
/// so siblings sharing a base never observe each other's additions. A
/// `ProtectedSet` can itself serve as the base of another.
pub struct ProtectedSet<T> {
    base: Arc<dyn Contains<T> + Send + Sync>,
    overlay: RwLock<HashSet<T>>,
}

impl<T: Eq + Hash> ProtectedSet<T> {
    pub fn new(base: Arc<dyn Contains<T> + Send + Sync>) -> Self {
        Self {
            base,
            overlay: RwLock::new(HashSet::new()),
        }
    }

    /// Add to the overlay; returns `false` if already present in either layer.
    pub fn insert(&self, item: T) -> bool {
        if self.base.contains(&item) {
            return false;
        }
        self.overlay.write().insert(item)
    }

    pub fn extend<I: IntoIterator<Item = T>>(&self, items: I) {
        for item in items {
            self.insert(item);
        }
    }

    #[must_use]
    pub fn overlay_len(&self) -> usize {
        self.overlay.read().len()
    }
}

impl<T: Eq + Hash> Contains<T> for ProtectedSet<T> {
    fn contains(&self, item: &T) -> bool {
        self.overlay.read().contains(item) || self.base.contains(item)
    }
}

impl<T> fmt::Debug for ProtectedSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectedSet").finish_non_exhaustive()
    }
}
