//! Volatile store for tests and embedders that persist elsewhere.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::SettingsStore;
use crate::error::StoreError;
use crate::model::Settings;
use crate::pipeline::history::CompletionEntry;

#[derive(Default)]
pub struct MemoryStore {
    settings: RwLock<Settings>,
    history: RwLock<Vec<CompletionEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Seed the completion history (newest first).
    pub async fn set_history(&self, entries: Vec<CompletionEntry>) {
        *self.history.write().await = entries;
    }

    pub async fn history(&self) -> Vec<CompletionEntry> {
        self.history.read().await.clone()
    }

    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn load(&self) -> Result<Settings, StoreError> {
        Ok(self.settings.read().await.clone())
    }

    async fn save(&self, settings: &Settings) -> Result<(), StoreError> {
        *self.settings.write().await = settings.clone();
        Ok(())
    }

    async fn load_history(&self) -> Result<Vec<CompletionEntry>, StoreError> {
        Ok(self.history.read().await.clone())
    }

    async fn save_history(&self, entries: &[CompletionEntry]) -> Result<(), StoreError> {
        *self.history.write().await = entries.to_vec();
        Ok(())
    }
}
