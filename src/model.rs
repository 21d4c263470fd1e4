//! Core data model: items, settings, counters, and status snapshots.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ControlError;

/// Feed-assigned item identifier. Monotonically increasing within a feed.
pub type ItemId = u64;

// ── Items ───────────────────────────────────────────────────────────

/// What the item accessor reports for a single feed item.
///
/// Snapshots are never cached for decisions: a reaction can appear on an
/// item after it was detected, so the engine re-queries before acting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub id: ItemId,
    /// Message body as rendered in the feed.
    pub text: String,
    /// Display name of the message author.
    pub author: String,
    /// Someone (possibly us) already reacted to this item.
    #[serde(default)]
    pub has_visible_reaction: bool,
}

impl ItemSnapshot {
    pub fn new(id: ItemId, text: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            author: author.into(),
            has_visible_reaction: false,
        }
    }

    /// Mark the snapshot as already carrying a reaction.
    pub fn with_reaction(mut self) -> Self {
        self.has_visible_reaction = true;
        self
    }
}

// ── Settings ────────────────────────────────────────────────────────

/// Verbosity exposed to the command channel: 0 = off, 1 = basic, 2 = debug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LogLevel {
    Off,
    Basic,
    Debug,
}

impl LogLevel {
    /// `EnvFilter` directive for this level.
    pub fn filter_directive(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Basic => "info",
            Self::Debug => "info,message_finder=debug",
        }
    }
}

impl TryFrom<u8> for LogLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Off),
            1 => Ok(Self::Basic),
            2 => Ok(Self::Debug),
            other => Err(format!("log level must be 0, 1 or 2 (got {other})")),
        }
    }
}

impl From<LogLevel> for u8 {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => 0,
            LogLevel::Basic => 1,
            LogLevel::Debug => 2,
        }
    }
}

/// Externally mutable runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub log_level: LogLevel,
    /// Chance (0–100) that an otherwise eligible item is acted on.
    pub action_probability: u8,
    /// Pause the engine after every successful action.
    pub auto_pause_after_action: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Basic,
            action_probability: 70,
            auto_pause_after_action: false,
        }
    }
}

impl Settings {
    /// Merge a partial update. Validates every field before touching any,
    /// so a rejected patch leaves the settings unchanged.
    pub fn apply(&mut self, patch: &SettingsPatch) -> Result<(), ControlError> {
        let log_level = patch
            .log_level
            .map(|raw| {
                u8::try_from(raw)
                    .map_err(|_| format!("log level must be 0, 1 or 2 (got {raw})"))
                    .and_then(LogLevel::try_from)
                    .map_err(|message| ControlError::InvalidValue {
                        field: "log_level".into(),
                        message,
                    })
            })
            .transpose()?;

        let probability = patch
            .action_probability
            .map(|raw| match u8::try_from(raw) {
                Ok(p) if p <= 100 => Ok(p),
                _ => Err(ControlError::InvalidValue {
                    field: "action_probability".into(),
                    message: format!("must be between 0 and 100 (got {raw})"),
                }),
            })
            .transpose()?;

        if let Some(level) = log_level {
            self.log_level = level;
        }
        if let Some(p) = probability {
            self.action_probability = p;
        }
        if let Some(auto_pause) = patch.auto_pause_after_action {
            self.auto_pause_after_action = auto_pause;
        }
        Ok(())
    }
}

/// Partial settings update. Accepts the camelCase names used by the
/// browser-side client as aliases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default, alias = "logLevel", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<i64>,
    #[serde(
        default,
        alias = "actionProbability",
        alias = "commentProbability",
        skip_serializing_if = "Option::is_none"
    )]
    pub action_probability: Option<i64>,
    #[serde(
        default,
        alias = "autoPauseAfterAction",
        alias = "autoPauseAfterComment",
        skip_serializing_if = "Option::is_none"
    )]
    pub auto_pause_after_action: Option<bool>,
}

impl SettingsPatch {
    pub fn log_level(level: i64) -> Self {
        Self {
            log_level: Some(level),
            ..Default::default()
        }
    }

    pub fn probability(value: i64) -> Self {
        Self {
            action_probability: Some(value),
            ..Default::default()
        }
    }

    pub fn auto_pause(value: bool) -> Self {
        Self {
            auto_pause_after_action: Some(value),
            ..Default::default()
        }
    }
}

// ── Counters and status ─────────────────────────────────────────────

/// Session counters. Only ever incremented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub acted_on: u64,
    pub skipped_by_sampling: u64,
    pub skipped_by_probability: u64,
    pub ignored_by_policy: u64,
    /// Items that passed the watermark gate.
    pub evaluated: u64,
}

/// Point-in-time view of the engine, served to the control surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub session_id: Uuid,
    pub paused: bool,
    pub waiting_for_cooldown: bool,
    /// Item occupying the dispatch slot (waiting or executing).
    pub pending_item_id: Option<ItemId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_ms: Option<u64>,
    pub backlog_len: usize,
    pub stats: Stats,
    pub baseline: Option<ItemId>,
    pub watermark: Option<ItemId>,
    pub settings: Settings,
}
