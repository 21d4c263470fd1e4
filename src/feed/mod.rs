//! Feed abstraction: where items come from.
//!
//! A feed is anything that can report item insertions and changes as a
//! lazy stream and answer point queries about a single item. The browser
//! DOM, a JSON-lines pipe and an in-memory test double all fit behind
//! [`FeedSource`].

pub mod memory;
pub mod stdin;
pub mod watcher;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::FeedError;
use crate::model::{ItemId, ItemSnapshot};

pub use memory::MemoryFeed;
pub use stdin::JsonLinesFeed;
pub use watcher::{FeedWatcher, Observation, ObservationKind};

/// Raw notification from a feed source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEvent {
    /// A new item node appeared.
    Inserted(ItemId),
    /// An existing item changed (typically a reaction was added).
    Changed(ItemId),
}

/// Live event stream. Infinite for real feeds; ends only when the source goes away.
pub type FeedStream = Pin<Box<dyn Stream<Item = FeedEvent> + Send>>;

/// A watched feed plus its item accessor.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Start observing insertions and changes. May be called once.
    async fn observe(&self) -> Result<FeedStream, FeedError>;

    /// Identifiers currently present. Used once at startup for the baseline.
    async fn current_items(&self) -> Result<Vec<ItemId>, FeedError>;

    /// Fresh snapshot of one item, `None` if it is gone.
    async fn inspect(&self, id: ItemId) -> Option<ItemSnapshot>;

    /// Cosmetic marker on the baseline item. Headless feeds ignore it.
    async fn mark_baseline(&self, _id: ItemId) {}
}
