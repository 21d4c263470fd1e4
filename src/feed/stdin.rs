//! JSON-lines feed: drives the engine from a pipe instead of a browser.
//!
//! One record per line:
//!
//! ```text
//! {"op":"insert","id":101,"text":"[5] (ann@example.com)","author":"ann"}
//! {"op":"react","id":101}
//! {"op":"remove","id":101}
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

use super::{FeedSource, FeedStream, MemoryFeed};
use crate::error::FeedError;
use crate::model::{ItemId, ItemSnapshot};

type LineReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// One line of input.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FeedRecord {
    Insert {
        id: ItemId,
        text: String,
        #[serde(default)]
        author: String,
        #[serde(default)]
        reacted: bool,
    },
    React {
        id: ItemId,
    },
    Remove {
        id: ItemId,
    },
}

impl FeedRecord {
    pub fn parse(line: &str) -> Result<Self, FeedError> {
        serde_json::from_str(line).map_err(|e| FeedError::Malformed(format!("{e}: {line}")))
    }

    async fn apply(self, feed: &MemoryFeed) {
        match self {
            Self::Insert {
                id,
                text,
                author,
                reacted,
            } => {
                let mut item = ItemSnapshot::new(id, text, author);
                item.has_visible_reaction = reacted;
                feed.insert(item).await;
            }
            Self::React { id } => {
                if !feed.add_reaction(id).await {
                    tracing::debug!(item_id = id, "Reaction for unknown item ignored");
                }
            }
            Self::Remove { id } => {
                feed.remove(id).await;
            }
        }
    }
}

/// Feed backed by newline-delimited JSON records.
///
/// Reading starts on `observe()`, so the startup baseline only covers
/// whatever was there before (nothing, for a fresh pipe).
pub struct JsonLinesFeed {
    items: Arc<MemoryFeed>,
    reader: Mutex<Option<LineReader>>,
}

impl JsonLinesFeed {
    pub fn stdin() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }

    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
    {
        Self {
            items: Arc::new(MemoryFeed::new()),
            reader: Mutex::new(Some(Box::new(reader))),
        }
    }
}

#[async_trait]
impl FeedSource for JsonLinesFeed {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn observe(&self) -> Result<FeedStream, FeedError> {
        let reader = self
            .reader
            .lock()
            .await
            .take()
            .ok_or_else(|| FeedError::AlreadyObserved {
                name: self.name().to_string(),
            })?;
        let stream = self.items.observe().await?;

        let items = Arc::clone(&self.items);
        tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match FeedRecord::parse(line) {
                            Ok(record) => record.apply(&items).await,
                            Err(e) => tracing::warn!(error = %e, "Skipping feed line"),
                        }
                    }
                    Ok(None) => {
                        tracing::info!("Feed input closed");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Error reading feed input: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(stream)
    }

    async fn current_items(&self) -> Result<Vec<ItemId>, FeedError> {
        self.items.current_items().await
    }

    async fn inspect(&self, id: ItemId) -> Option<ItemSnapshot> {
        self.items.inspect(id).await
    }
}
