//! Stream reducers over sorted entity sequences.

use std::collections::{HashMap, VecDeque};
use std::iter::Peekable;

use pkgqa_core::{Entity, PackageKey, PkgItem};

fn version_key(entity: &Entity) -> Option<PackageKey> {
    entity.as_version().map(|item| item.pkg().key())
}

/// Keeps the latest release and the latest live version per slot for each
/// run of same-identity versions.
///
/// The last version seen for a slot wins, so input must be ascending within
/// an identity. In partial mode superseded versions are re-emitted marked as
/// filtered instead of dropped. Non-version entities pass through untouched.
pub struct LatestSlots<I: Iterator<Item = Entity>> {
    inner: Peekable<I>,
    partial: bool,
    pending: VecDeque<Entity>,
}

impl<I: Iterator<Item = Entity>> LatestSlots<I> {
    pub fn new(inner: I, partial: bool) -> Self {
        Self {
            inner: inner.peekable(),
            partial,
            pending: VecDeque::new(),
        }
    }

    fn refill(&mut self, first: PkgItem) {
        let key = first.pkg().key();
        let mut run = vec![first];
        while let Some(next) = self
            .inner
            .next_if(|e| version_key(e).as_ref() == Some(&key))
        {
            if let Entity::Version(item) = next {
                run.push(item);
            }
        }

        let mut latest: HashMap<String, usize> = HashMap::new();
        for (idx, item) in run.iter().enumerate() {
            latest.insert(item.pkg().slot_key(), idx);
        }
        let mut keep = vec![false; run.len()];
        for idx in latest.into_values() {
            keep[idx] = true;
        }

        for (item, keep) in run.into_iter().zip(keep) {
            if keep {
                self.pending.push_back(Entity::Version(item));
            } else if self.partial {
                self.pending
                    .push_back(Entity::Version(PkgItem::filtered(item.into_pkg())));
            }
        }
    }
}

impl<I: Iterator<Item = Entity>> Iterator for LatestSlots<I> {
    type Item = Entity;

    fn next(&mut self) -> Option<Entity> {
        loop {
            if let Some(entity) = self.pending.pop_front() {
                return Some(entity);
            }
            match self.inner.next()? {
                Entity::Version(item) => self.refill(item),
                other => return Some(other),
            }
        }
    }
}

/// What adjacent versions are coalesced by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Package,
    Category,
}

impl GroupKey {
    fn of(self, item: &PkgItem) -> (String, String) {
        let cpv = &item.pkg().cpv;
        match self {
            Self::Package => (cpv.category.clone(), cpv.package.clone()),
            Self::Category => (cpv.category.clone(), String::new()),
        }
    }
}

/// Merges adjacent versions sharing a [`GroupKey`] into one list entity.
///
/// Equal keys separated by another key stay separate groups.
pub struct GroupAdjacent<I: Iterator<Item = Entity>> {
    inner: Peekable<I>,
    key: GroupKey,
}

impl<I: Iterator<Item = Entity>> GroupAdjacent<I> {
    pub fn new(inner: I, key: GroupKey) -> Self {
        Self {
            inner: inner.peekable(),
            key,
        }
    }
}

impl<I: Iterator<Item = Entity>> Iterator for GroupAdjacent<I> {
    type Item = Entity;

    fn next(&mut self) -> Option<Entity> {
        let first = match self.inner.next()? {
            Entity::Version(item) => item,
            other => return Some(other),
        };
        let group_key = self.key.of(&first);
        let mut group = vec![first];
        let key = self.key;
        while let Some(Entity::Version(item)) = self
            .inner
            .next_if(|e| e.as_version().is_some_and(|item| key.of(item) == group_key))
        {
            group.push(item);
        }
        Some(match self.key {
            GroupKey::Package => Entity::Package(group),
            GroupKey::Category => Entity::Category(group),
        })
    }
}

/// Drops an item equal to the one directly before it.
pub fn dedup_adjacent<T, I>(iter: I) -> impl Iterator<Item = T>
where
    T: PartialEq + Clone,
    I: Iterator<Item = T>,
{
    let mut last: Option<T> = None;
    iter.filter(move |item| {
        if last.as_ref() == Some(item) {
            return false;
        }
        last = Some(item.clone());
        true
    })
}
