use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::ids::ItemId;

/// Mastery flags for a requested set of items.
///
/// An item with no key has never been practiced (or nothing is known about
/// it). Both a missing key and an explicit `false` read as not mastered
/// through [`MasteryMap::is_mastered`]; use [`MasteryMap::contains`] to tell
/// them apart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MasteryMap {
    entries: BTreeMap<ItemId, bool>,
}

impl MasteryMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the mastery flag for an item. A later insert for the same item
    /// replaces the earlier one.
    pub fn insert(&mut self, item_id: ItemId, mastered: bool) {
        self.entries.insert(item_id, mastered);
    }

    #[must_use]
    pub fn get(&self, item_id: &ItemId) -> Option<bool> {
        self.entries.get(item_id).copied()
    }

    #[must_use]
    pub fn is_mastered(&self, item_id: &ItemId) -> bool {
        self.get(item_id).unwrap_or(false)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries flagged as mastered.
    #[must_use]
    pub fn mastered_count(&self) -> usize {
        self.entries.values().filter(|mastered| **mastered).count()
    }
}

impl FromIterator<(ItemId, bool)> for MasteryMap {
    fn from_iter<I: IntoIterator<Item = (ItemId, bool)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Mastered vs. total counts for a topic, lesson, or level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TopicProgress {
    pub mastered: usize,
    pub total: usize,
}

impl TopicProgress {
    #[must_use]
    pub fn new(mastered: usize, total: usize) -> Self {
        Self { mastered, total }
    }

    /// Fraction of mastered items in `0.0..=1.0`; `0.0` for an empty topic.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.mastered as f64 / self.total as f64
    }
}
