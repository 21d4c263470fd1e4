//! Configuration types.
//!
//! Everything is read from `FINDER_*` environment variables with typed
//! defaults. Runtime-mutable knobs (probability, log level, auto-pause)
//! live in [`crate::model::Settings`] instead.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::pipeline::sampler::SamplingRange;

/// Default cooldown before acting on a restricted author's item (5 minutes).
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);

/// Tags that mark the first and last slot in a listing rather than a target.
pub const DEFAULT_RESERVED_TAGS: [u32; 2] = [1, 20];

/// Engine configuration. Fixed for the lifetime of a session.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long after detection a restricted author's item must wait.
    pub cooldown: Duration,
    /// Authors subject to the cooldown. `*` matches everyone.
    pub restricted_authors: Vec<String>,
    /// Tag values that are never action targets.
    pub reserved_tags: Vec<u32>,
    /// Rotating skip cadence. `None` disables the sampling gate.
    pub sampling: Option<SamplingRange>,
    /// How many completed `tag|contact` keys to remember.
    pub duplicate_history: usize,
    /// Forget completed keys older than this. `None` keeps them until evicted.
    pub duplicate_window: Option<Duration>,
    /// Upper bound on a single executor call.
    pub action_timeout: Duration,
    /// Payload template with `{tag}`, `{contact}`, `{author}`, `{id}` placeholders.
    pub action_template: String,
    /// Periodic stats broadcast interval. Zero turns the periodic broadcast off.
    pub stats_interval: Duration,
    /// Start with dispatching halted.
    pub start_paused: bool,
    /// Fixed RNG seed. Only useful for reproducible runs and tests.
    pub rng_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            restricted_authors: Vec::new(),
            reserved_tags: DEFAULT_RESERVED_TAGS.to_vec(),
            sampling: Some(SamplingRange::new(5, 9)),
            duplicate_history: 10,
            duplicate_window: None,
            action_timeout: Duration::from_secs(30),
            action_template: "[{tag}]".to_string(),
            stats_interval: Duration::from_secs(5),
            start_paused: false,
            rng_seed: None,
        }
    }
}

impl EngineConfig {
    /// Build from `FINDER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let cooldown = Duration::from_secs(env_parse(
            "FINDER_COOLDOWN_SECS",
            defaults.cooldown.as_secs(),
        )?);

        let restricted_authors = env_list("FINDER_RESTRICTED_AUTHORS");

        let reserved_tags = match std::env::var("FINDER_RESERVED_TAGS") {
            Ok(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<u32>().map_err(|e| ConfigError::InvalidValue {
                        key: "FINDER_RESERVED_TAGS".into(),
                        message: format!("{s:?}: {e}"),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Err(_) => defaults.reserved_tags,
        };

        let sampling_min: u32 = env_parse("FINDER_SAMPLING_MIN", 5)?;
        let sampling_max: u32 = env_parse("FINDER_SAMPLING_MAX", 9)?;
        let sampling = if sampling_min == 0 || sampling_max == 0 {
            None
        } else if sampling_min > sampling_max {
            return Err(ConfigError::InvalidValue {
                key: "FINDER_SAMPLING_MIN".into(),
                message: format!("{sampling_min} is greater than FINDER_SAMPLING_MAX ({sampling_max})"),
            });
        } else {
            Some(SamplingRange::new(sampling_min, sampling_max))
        };

        let duplicate_window = std::env::var("FINDER_DUPLICATE_WINDOW_SECS")
            .ok()
            .map(|raw| {
                raw.trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|e| ConfigError::InvalidValue {
                        key: "FINDER_DUPLICATE_WINDOW_SECS".into(),
                        message: e.to_string(),
                    })
            })
            .transpose()?;

        Ok(Self {
            cooldown,
            restricted_authors,
            reserved_tags,
            sampling,
            duplicate_history: env_parse("FINDER_DUPLICATE_HISTORY", defaults.duplicate_history)?,
            duplicate_window,
            action_timeout: Duration::from_secs(env_parse(
                "FINDER_ACTION_TIMEOUT_SECS",
                defaults.action_timeout.as_secs(),
            )?),
            action_template: std::env::var("FINDER_ACTION_TEMPLATE")
                .unwrap_or(defaults.action_template),
            stats_interval: Duration::from_secs(env_parse(
                "FINDER_STATS_INTERVAL_SECS",
                defaults.stats_interval.as_secs(),
            )?),
            start_paused: env_parse("FINDER_START_PAUSED", false)?,
            rng_seed: None,
        })
    }
}

/// Control server and persistence settings for the binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub ws_port: u16,
    pub state_path: PathBuf,
    /// Directory for rolling log files. `None` logs to stderr only.
    pub log_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            ws_port: env_parse("FINDER_WS_PORT", 8765)?,
            state_path: std::env::var("FINDER_STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/finder-state.json")),
            log_dir: std::env::var("FINDER_LOG_DIR").ok().map(PathBuf::from),
        })
    }
}

/// Telegram Bot API credentials for the notifier.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub chat_id: i64,
}

impl TelegramConfig {
    /// Returns `Ok(None)` when `BOT_TOKEN` is unset (notifier disabled).
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(token) = std::env::var("BOT_TOKEN") else {
            return Ok(None);
        };
        let raw_chat = std::env::var("CHAT_ID")
            .map_err(|_| ConfigError::MissingEnvVar("CHAT_ID".into()))?;
        let chat_id = raw_chat
            .trim()
            .parse::<i64>()
            .map_err(|e| ConfigError::InvalidValue {
                key: "CHAT_ID".into(),
                message: e.to_string(),
            })?;
        Ok(Some(Self {
            bot_token: SecretString::from(token),
            chat_id,
        }))
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.cooldown, Duration::from_secs(300));
        assert_eq!(config.reserved_tags, vec![1, 20]);
        assert_eq!(config.duplicate_history, 10);
        assert!(config.duplicate_window.is_none());
        assert!(config.sampling.is_some());
        assert!(!config.start_paused);
    }

    #[test]
    fn env_parse_falls_back_to_default() {
        let value: u64 = env_parse("FINDER_TEST_UNSET_VARIABLE_XYZ", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn env_list_of_unset_variable_is_empty() {
        assert!(env_list("FINDER_TEST_UNSET_LIST_XYZ").is_empty());
    }
}
