//! Telegram notifier and command bot over the Bot API.
//!
//! Outbound: HTML-formatted `sendMessage` for actions, preemptions and
//! pause changes. Inbound: long-polls `getUpdates` and maps `/pause`,
//! `/resume`, `/stats`, `/log`, `/prob`, `/autopause` onto the engine.
//! Only the configured chat is served.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::task::JoinHandle;

use super::Notifier;
use crate::config::TelegramConfig;
use crate::control::Command;
use crate::engine::{EngineEvent, EngineHandle};
use crate::error::NotifyError;
use crate::model::StatusSnapshot;

const TELEGRAM_API: &str = "https://api.telegram.org";

const POLL_BACKOFF_START: Duration = Duration::from_secs(5);
const POLL_BACKOFF_MAX: Duration = Duration::from_secs(60);

const HELP_TEXT: &str = "<b>Message Finder</b>\n\n\
/pause - stop acting\n\
/resume - start acting again\n\
/stats - counters and settings\n\
/log 0|1|2 - log level\n\
/prob 0-100 - action probability\n\
/autopause on|off - pause after every action";

pub struct TelegramNotifier {
    bot_token: SecretString,
    chat_id: i64,
    client: reqwest::Client,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id,
            client: reqwest::Client::new(),
            api_base: TELEGRAM_API.to_string(),
        }
    }

    /// Point at a different Bot API server.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.api_base,
            self.bot_token.expose_secret()
        )
    }

    /// Send an HTML message to the configured chat.
    pub async fn send_html(&self, text: &str) -> Result<(), NotifyError> {
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(NotifyError::SendFailed {
                name: "telegram".into(),
                reason: format!("sendMessage failed ({status}): {err}"),
            });
        }
        Ok(())
    }

    /// Long-poll for bot commands and apply them to the engine.
    pub fn spawn_command_poller(self: Arc<Self>, engine: EngineHandle) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut offset: i64 = 0;
            let mut backoff = POLL_BACKOFF_START;

            tracing::info!("Telegram bot listening for commands...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message"]
                });

                let results = match self.get_updates(&body).await {
                    Ok(results) => {
                        backoff = POLL_BACKOFF_START;
                        results
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            retry_in_secs = backoff.as_secs(),
                            "Telegram poll failed"
                        );
                        tokio::time::sleep(backoff).await;
                        backoff = next_backoff(backoff);
                        continue;
                    }
                };

                for update in results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(serde_json::Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(message) = update.get("message") else {
                        continue;
                    };
                    let chat_id = message
                        .get("chat")
                        .and_then(|c| c.get("id"))
                        .and_then(serde_json::Value::as_i64);
                    if chat_id != Some(self.chat_id) {
                        tracing::warn!(chat_id = ?chat_id, "Telegram: ignoring message from foreign chat");
                        continue;
                    }
                    let Some(text) = message.get("text").and_then(serde_json::Value::as_str) else {
                        continue;
                    };

                    let Some(reply) = self.handle_command(text, &engine).await else {
                        continue;
                    };
                    if let Err(e) = self.send_html(&reply).await {
                        tracing::warn!(error = %e, "Telegram reply failed");
                    }
                }
            }
        })
    }

    /// One `getUpdates` round trip. A non-2xx status or `"ok": false` is an error.
    async fn get_updates(&self, body: &serde_json::Value) -> Result<Vec<serde_json::Value>, NotifyError> {
        let resp = self
            .client
            .post(self.api_url("getUpdates"))
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        let data: serde_json::Value = resp.json().await?;

        let ok = data.get("ok").and_then(serde_json::Value::as_bool) == Some(true);
        match data.get("result").and_then(serde_json::Value::as_array) {
            Some(results) if ok && status.is_success() => Ok(results.clone()),
            _ => {
                let description = data
                    .get("description")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("no description");
                Err(NotifyError::SendFailed {
                    name: "telegram".into(),
                    reason: format!("getUpdates failed ({status}): {description}"),
                })
            }
        }
    }

    async fn handle_command(&self, text: &str, engine: &EngineHandle) -> Option<String> {
        let reply = match BotCommand::parse(text)? {
            Ok(BotCommand::Help) => HELP_TEXT.to_string(),
            Ok(BotCommand::Control(command)) => {
                tracing::info!(?command, "Telegram command");
                match command.apply(engine).await {
                    Ok(status) => format_status(&status),
                    Err(e) => format!("⚠️ {}", escape_html(&e.to_string())),
                }
            }
            Err(usage) => format!("⚠️ {}", escape_html(&usage)),
        };
        Some(reply)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn notify(&self, event: &EngineEvent) -> Result<(), NotifyError> {
        match format_event(event) {
            Some(text) => self.send_html(&text).await,
            None => Ok(()),
        }
    }
}

// ── Commands ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Help,
    Control(Command),
}

impl BotCommand {
    /// `None` for plain chat text; `Some(Err(usage))` for a malformed command.
    pub fn parse(text: &str) -> Option<Result<Self, String>> {
        let text = text.trim();
        if !text.starts_with('/') {
            return None;
        }
        let mut parts = text.split_whitespace();
        let head = parts.next()?;
        // "/pause@SomeBot" in group chats
        let name = head[1..].split('@').next().unwrap_or_default();
        let arg = parts.next();

        let parsed = match name {
            "start" | "help" => Ok(Self::Help),
            "pause" => Ok(Self::Control(Command::Pause)),
            "resume" => Ok(Self::Control(Command::Resume)),
            "stats" | "status" => Ok(Self::Control(Command::RequestStats)),
            "log" => arg
                .and_then(|a| a.parse::<i64>().ok())
                .map(|level| Self::Control(Command::SetLogLevel { level }))
                .ok_or_else(|| "Usage: /log 0|1|2".to_string()),
            "prob" => arg
                .and_then(|a| a.trim_end_matches('%').parse::<i64>().ok())
                .map(|value| Self::Control(Command::SetProbability { value }))
                .ok_or_else(|| "Usage: /prob 0-100".to_string()),
            "autopause" => match arg.map(str::to_lowercase).as_deref() {
                Some("on" | "true" | "1") => Ok(Self::Control(Command::SetAutoPause { value: true })),
                Some("off" | "false" | "0") => {
                    Ok(Self::Control(Command::SetAutoPause { value: false }))
                }
                _ => Err("Usage: /autopause on|off".to_string()),
            },
            other => Err(format!("Unknown command /{other}, try /help")),
        };
        Some(parsed)
    }
}

// ── Formatting ──────────────────────────────────────────────────────────

/// HTML message for events worth a chat notification.
pub fn format_event(event: &EngineEvent) -> Option<String> {
    let text = match event {
        EngineEvent::Acted {
            item_id,
            tag,
            contact,
            author,
            text,
            at,
            ..
        } => {
            let mut msg = String::from("✅ <b>Acted on item</b>\n\n");
            msg += &format!("<b>Item:</b> #{item_id}\n");
            msg += &format!("<b>Tag:</b> [{tag}]\n");
            msg += &format!("<b>Author:</b> {}\n", escape_html(author));
            if let Some(contact) = contact {
                msg += &format!("<b>Contact:</b> {}\n", escape_html(contact));
            }
            msg += &format!("<b>Time:</b> {}\n\n", at.format("%Y-%m-%d %H:%M:%S UTC"));
            msg += &format!("<b>Text:</b>\n<code>{}</code>", escape_html(text));
            msg
        }
        EngineEvent::Preempted { item_id } => {
            format!("↩️ <b>Preempted</b> item #{item_id}: someone reacted first")
        }
        EngineEvent::ActionFailed { item_id, reason } => {
            format!("❌ <b>Action failed</b> on item #{item_id}: {}", escape_html(reason))
        }
        EngineEvent::StatusUpdate { paused } => {
            if *paused {
                "⏸️ <b>Paused</b>".to_string()
            } else {
                "▶️ <b>Active</b>".to_string()
            }
        }
        _ => return None,
    };
    Some(text)
}

pub fn format_status(status: &StatusSnapshot) -> String {
    let stats = &status.stats;
    let settings = &status.settings;
    let mut msg = String::from("📊 <b>Status</b>\n\n");
    msg += &format!(
        "<b>State:</b> {}\n",
        if status.paused { "⏸️ paused" } else { "▶️ active" }
    );
    msg += &format!("<b>Acted on:</b> {}\n", stats.acted_on);
    msg += &format!(
        "<b>Skipped:</b> {} sampling, {} probability\n",
        stats.skipped_by_sampling, stats.skipped_by_probability
    );
    msg += &format!("<b>Ignored:</b> {}\n", stats.ignored_by_policy);
    msg += &format!("<b>Backlog:</b> {}\n", status.backlog_len);
    match status.cooldown_remaining_ms {
        Some(ms) => msg += &format!("<b>Cooldown:</b> {}s left\n", ms.div_ceil(1000)),
        None => msg += "<b>Cooldown:</b> no\n",
    }
    msg += "\n⚙️ <b>Settings</b>\n";
    msg += &format!(
        "<b>Log level:</b> {} (0 off, 1 basic, 2 debug)\n",
        u8::from(settings.log_level)
    );
    msg += &format!("<b>Probability:</b> {}%\n", settings.action_probability);
    msg += &format!(
        "<b>Auto-pause:</b> {}",
        if settings.auto_pause_after_action { "on" } else { "off" }
    );
    msg
}

/// Double the poll delay, capped at [`POLL_BACKOFF_MAX`].
fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(POLL_BACKOFF_MAX)
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

// ── Tests ───────────────────────────────────────────────────────────
