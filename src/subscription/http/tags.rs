//! Resource tags and the index from tag to cache entries.
//!
//! Queries declare the tags they provide and mutations the tags they
//! invalidate; the index connects the two without either side knowing the
//! shape of the other.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use parking_lot::RwLock;

use super::query::QueryKey;

/// A logical resource category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tag {
    Cart,
    Products,
    Stats,
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cart => "Cart",
            Self::Products => "Products",
            Self::Stats => "Stats",
        })
    }
}

/// Index from tag to the keys of the entries carrying it.
#[derive(Debug, Default)]
pub struct TagIndex {
    by_tag: RwLock<HashMap<Tag, BTreeSet<QueryKey>>>,
}

impl TagIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that the entry at `key` carries `tags`.
    pub fn insert(&self, key: &QueryKey, tags: &[Tag]) {
        let mut by_tag = self.by_tag.write();
        for tag in tags {
            by_tag.entry(*tag).or_default().insert(key.clone());
        }
    }

    /// Forgets an evicted entry.
    pub fn remove(&self, key: &QueryKey, tags: &[Tag]) {
        let mut by_tag = self.by_tag.write();
        for tag in tags {
            if let Some(keys) = by_tag.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    by_tag.remove(tag);
                }
            }
        }
    }

    /// Keys of every entry whose tags intersect `tags`, each listed once.
    #[must_use]
    pub fn keys_for(&self, tags: &[Tag]) -> Vec<QueryKey> {
        let by_tag = self.by_tag.read();
        tags.iter()
            .filter_map(|tag| by_tag.get(tag))
            .flatten()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Number of entries carrying `tag`.
    #[must_use]
    pub fn count(&self, tag: Tag) -> usize {
        self.by_tag.read().get(&tag).map_or(0, BTreeSet::len)
    }
}
