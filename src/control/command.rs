//! Inbound command frames.

use serde::{Deserialize, Serialize};

use crate::engine::EngineHandle;
use crate::error::ControlError;
use crate::model::{SettingsPatch, StatusSnapshot};

/// One command from a control client, e.g. `{"type":"setProbability","value":40}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    Pause,
    Resume,
    SetLogLevel { level: i64 },
    SetProbability { value: i64 },
    SetAutoPause { value: bool },
    RequestStats,
    ApplySettings { settings: SettingsPatch },
}

impl Command {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Run against the engine and return the resulting status.
    pub async fn apply(self, engine: &EngineHandle) -> Result<StatusSnapshot, ControlError> {
        match self {
            Self::Pause => engine.pause().await,
            Self::Resume => engine.resume().await,
            Self::SetLogLevel { level } => engine.apply_settings(SettingsPatch::log_level(level)).await,
            Self::SetProbability { value } => {
                engine.apply_settings(SettingsPatch::probability(value)).await
            }
            Self::SetAutoPause { value } => {
                engine.apply_settings(SettingsPatch::auto_pause(value)).await
            }
            Self::RequestStats => engine.status().await,
            Self::ApplySettings { settings } => engine.apply_settings(settings).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_client_frames() {
        assert_eq!(Command::parse(r#"{"type":"pause"}"#).unwrap(), Command::Pause);
        assert_eq!(
            Command::parse(r#"{"type":"setLogLevel","level":2}"#).unwrap(),
            Command::SetLogLevel { level: 2 }
        );
        assert_eq!(
            Command::parse(r#"{"type":"setProbability","value":40}"#).unwrap(),
            Command::SetProbability { value: 40 }
        );
        assert_eq!(
            Command::parse(r#"{"type":"setAutoPause","value":true}"#).unwrap(),
            Command::SetAutoPause { value: true }
        );
        assert_eq!(
            Command::parse(r#"{"type":"requestStats"}"#).unwrap(),
            Command::RequestStats
        );
    }

    #[test]
    fn parses_apply_settings_with_client_names() {
        let cmd =
            Command::parse(r#"{"type":"applySettings","settings":{"commentProbability":15}}"#)
                .unwrap();
        assert_eq!(
            cmd,
            Command::ApplySettings {
                settings: SettingsPatch::probability(15)
            }
        );
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(Command::parse(r#"{"type":"reboot"}"#).is_err());
        assert!(Command::parse("pause").is_err());
    }
}
