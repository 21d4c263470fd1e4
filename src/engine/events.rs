//! Outbound engine events, fanned out to WebSocket clients and notifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ItemId, Settings, StatusSnapshot};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// An action completed on an item.
    Acted {
        item_id: ItemId,
        tag: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        contact: Option<String>,
        author: String,
        text: String,
        payload: String,
        at: DateTime<Utc>,
    },
    /// Paused flag changed.
    StatusUpdate { paused: bool },
    /// Full status snapshot.
    Stats { status: StatusSnapshot },
    /// An item entered its cooldown wait.
    Waiting { item_id: ItemId, remaining_ms: u64 },
    /// A waiting item lost the race to a foreign reaction.
    Preempted { item_id: ItemId },
    /// The executor rejected or timed out on an item.
    ActionFailed { item_id: ItemId, reason: String },
    SettingsUpdated { settings: Settings },
    /// A command from a client was rejected.
    Error { message: String },
}

impl EngineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Acted { .. } => "acted",
            Self::StatusUpdate { .. } => "status_update",
            Self::Stats { .. } => "stats",
            Self::Waiting { .. } => "waiting",
            Self::Preempted { .. } => "preempted",
            Self::ActionFailed { .. } => "action_failed",
            Self::SettingsUpdated { .. } => "settings_updated",
            Self::Error { .. } => "error",
        }
    }
}
