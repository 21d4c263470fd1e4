//! Completion log: what this process has already acted on.
//!
//! Serves two gates:
//! - interference: a reaction on one of our own completed items is ours,
//!   not a foreign one
//! - duplicate policy: a bounded, optionally time-limited history of
//!   `tag|contact` keys that must not be acted on twice

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ItemId;

/// One completed action, as persisted between sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEntry {
    pub item_id: ItemId,
    pub tag: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    /// `tag|contact`, absent when the item had no contact token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct CompletionLog {
    /// Newest first.
    entries: VecDeque<CompletionEntry>,
    capacity: usize,
    window: Option<Duration>,
    /// Every item acted on, never evicted.
    own_items: HashSet<ItemId>,
}

impl CompletionLog {
    pub fn new(capacity: usize, window: Option<Duration>) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            window,
            own_items: HashSet::new(),
        }
    }

    /// Load persisted entries (newest first), trimming to capacity.
    pub fn restore(&mut self, entries: Vec<CompletionEntry>) {
        for entry in entries.into_iter().take(self.capacity) {
            self.own_items.insert(entry.item_id);
            self.entries.push_back(entry);
        }
    }

    /// Record a completion and evict the oldest entry past capacity.
    pub fn record(&mut self, entry: CompletionEntry) {
        self.own_items.insert(entry.item_id);
        if self.capacity == 0 {
            return;
        }
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
    }

    /// Whether the reaction on this item came from us.
    pub fn is_own(&self, item_id: ItemId) -> bool {
        self.own_items.contains(&item_id)
    }

    /// Whether `key` was completed recently enough to block a repeat.
    pub fn contains_key(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.entries.iter().any(|e| {
            e.key.as_deref() == Some(key)
                && match self.window {
                    Some(window) => {
                        let age = now.signed_duration_since(e.completed_at);
                        chrono::Duration::from_std(window)
                            .map(|w| age < w)
                            .unwrap_or(true)
                    }
                    None => true,
                }
        })
    }

    pub fn entries(&self) -> Vec<CompletionEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
