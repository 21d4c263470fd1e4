//! Single JSON document on disk.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::SettingsStore;
use crate::error::StoreError;
use crate::model::Settings;
use crate::pipeline::history::CompletionEntry;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    settings: Settings,
    #[serde(default)]
    history: Vec<CompletionEntry>,
}

/// Keeps the whole document in memory and rewrites it on every save.
///
/// Writes go to a sibling `.tmp` file that is then renamed over the target,
/// so a crash mid-write leaves the previous state intact.
pub struct JsonFileStore {
    path: PathBuf,
    state: Mutex<Option<StateFile>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(None),
        }
    }

    async fn read(&self) -> Result<StateFile, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No saved state, using defaults");
                Ok(StateFile::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, state: &StateFile) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), "State saved");
        Ok(())
    }

    /// Apply `f` to the cached document (loading it first if needed) and persist.
    async fn update<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut StateFile) + Send,
    {
        let mut guard = self.state.lock().await;
        if guard.is_none() {
            *guard = Some(self.read().await?);
        }
        let state = guard.get_or_insert_with(StateFile::default);
        f(state);
        self.write(state).await
    }

    async fn snapshot(&self) -> Result<StateFile, StoreError> {
        let mut guard = self.state.lock().await;
        if let Some(state) = guard.as_ref() {
            return Ok(state.clone());
        }
        let state = self.read().await?;
        *guard = Some(state.clone());
        Ok(state)
    }
}

#[async_trait]
impl SettingsStore for JsonFileStore {
    async fn load(&self) -> Result<Settings, StoreError> {
        Ok(self.snapshot().await?.settings)
    }

    async fn save(&self, settings: &Settings) -> Result<(), StoreError> {
        let settings = settings.clone();
        self.update(move |state| state.settings = settings).await
    }

    async fn load_history(&self) -> Result<Vec<CompletionEntry>, StoreError> {
        Ok(self.snapshot().await?.history)
    }

    async fn save_history(&self, entries: &[CompletionEntry]) -> Result<(), StoreError> {
        let entries = entries.to_vec();
        self.update(move |state| state.history = entries).await
    }
}
