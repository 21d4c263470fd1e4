//! In-process feed, for tests and embedders that push items themselves.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use super::{FeedEvent, FeedSource, FeedStream};
use crate::error::FeedError;
use crate::model::{ItemId, ItemSnapshot};

pub struct MemoryFeed {
    items: RwLock<BTreeMap<ItemId, ItemSnapshot>>,
    tx: mpsc::UnboundedSender<FeedEvent>,
    /// Taken by the first `observe()`.
    rx: Mutex<Option<mpsc::UnboundedReceiver<FeedEvent>>>,
    baseline_mark: Mutex<Option<ItemId>>,
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self::with_items(Vec::new())
    }

    /// Pre-populate historical items. No events are emitted for them.
    pub fn with_items(items: Vec<ItemSnapshot>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            items: RwLock::new(items.into_iter().map(|i| (i.id, i)).collect()),
            tx,
            rx: Mutex::new(Some(rx)),
            baseline_mark: Mutex::new(None),
        }
    }

    /// Add (or replace) an item and announce the insertion.
    pub async fn insert(&self, item: ItemSnapshot) {
        let id = item.id;
        self.items.write().await.insert(id, item);
        self.emit(FeedEvent::Inserted(id));
    }

    /// Put a visible reaction on an item. Returns `false` if it doesn't exist.
    pub async fn add_reaction(&self, id: ItemId) -> bool {
        {
            let mut items = self.items.write().await;
            let Some(item) = items.get_mut(&id) else {
                return false;
            };
            item.has_visible_reaction = true;
        }
        self.emit(FeedEvent::Changed(id));
        true
    }

    /// Drop an item. Later `inspect()` calls return `None`.
    pub async fn remove(&self, id: ItemId) -> bool {
        self.items.write().await.remove(&id).is_some()
    }

    /// Re-announce an existing item as inserted (a re-render, in DOM terms).
    pub async fn renotify(&self, id: ItemId) {
        self.emit(FeedEvent::Inserted(id));
    }

    /// Item marked as the session baseline, if any.
    pub async fn baseline_mark(&self) -> Option<ItemId> {
        *self.baseline_mark.lock().await
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    fn emit(&self, event: FeedEvent) {
        // Nobody observing is fine; the receiver buffers until observe().
        if self.tx.send(event).is_err() {
            debug!(?event, "Feed event dropped, observer gone");
        }
    }
}

impl Default for MemoryFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedSource for MemoryFeed {
    fn name(&self) -> &str {
        "memory"
    }

    async fn observe(&self) -> Result<FeedStream, FeedError> {
        let rx = self
            .rx
            .lock()
            .await
            .take()
            .ok_or_else(|| FeedError::AlreadyObserved {
                name: self.name().to_string(),
            })?;
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn current_items(&self) -> Result<Vec<ItemId>, FeedError> {
        Ok(self.items.read().await.keys().copied().collect())
    }

    async fn inspect(&self, id: ItemId) -> Option<ItemSnapshot> {
        self.items.read().await.get(&id).cloned()
    }

    async fn mark_baseline(&self, id: ItemId) {
        *self.baseline_mark.lock().await = Some(id);
    }
}
