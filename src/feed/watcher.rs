//! Feed watcher: de-duplicated, order-preserving observation stream.

use std::collections::HashMap;

use futures::StreamExt;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{FeedEvent, FeedSource, FeedStream};
use crate::error::FeedError;
use crate::model::ItemId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationKind {
    /// First sighting of an item.
    Inserted,
    /// Something on an already-seen item changed.
    Changed,
}

/// One event handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub kind: ObservationKind,
    pub id: ItemId,
    /// When the item was first detected (not when this event arrived).
    pub detected_at: Instant,
}

/// Wraps a feed's live stream for the lifetime of one session.
///
/// Construction subscribes first and scans second, so nothing inserted
/// during startup is lost; anything caught by both lands at or below the
/// baseline and is rejected by the watermark gate. A watcher cannot be
/// restarted. A new session needs a new watcher.
pub struct FeedWatcher {
    stream: FeedStream,
    baseline: Option<ItemId>,
    /// Detection record: first-observed time per item. Write-once.
    detections: HashMap<ItemId, Instant>,
}

impl FeedWatcher {
    pub async fn start(feed: &dyn FeedSource) -> Result<Self, FeedError> {
        let stream = feed.observe().await?;
        let baseline = feed.current_items().await?.into_iter().max();

        if let Some(id) = baseline {
            feed.mark_baseline(id).await;
        }
        info!(feed = feed.name(), baseline = ?baseline, "Feed watcher started");

        Ok(Self {
            stream,
            baseline,
            detections: HashMap::new(),
        })
    }

    /// Highest identifier present at startup, `None` for an empty feed.
    pub fn baseline(&self) -> Option<ItemId> {
        self.baseline
    }

    pub fn detected_at(&self, id: ItemId) -> Option<Instant> {
        self.detections.get(&id).copied()
    }

    /// Next observation, or `None` once the source stream ends.
    ///
    /// Cancel-safe: nothing is awaited after the underlying stream yields.
    pub async fn next(&mut self) -> Option<Observation> {
        loop {
            let event = self.stream.next().await?;
            match event {
                FeedEvent::Inserted(id) => {
                    if self.detections.contains_key(&id) {
                        debug!(item_id = id, "Duplicate insertion ignored");
                        continue;
                    }
                    let now = Instant::now();
                    self.detections.insert(id, now);
                    return Some(Observation {
                        kind: ObservationKind::Inserted,
                        id,
                        detected_at: now,
                    });
                }
                FeedEvent::Changed(id) => {
                    // Only inserted items have a detection record. A change that
                    // arrives first must not swallow the later insertion.
                    let Some(&detected_at) = self.detections.get(&id) else {
                        debug!(item_id = id, "Change before insertion ignored");
                        continue;
                    };
                    return Some(Observation {
                        kind: ObservationKind::Changed,
                        id,
                        detected_at,
                    });
                }
            }
        }
    }
}
