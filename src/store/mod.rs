//! Persistence for settings and the completion history.
//!
//! Read once at startup, written on every external settings update and
//! after every completed action. Failures are logged by the engine and
//! never stop it.

pub mod json_file;
pub mod memory;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::Settings;
use crate::pipeline::history::CompletionEntry;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Stored settings, or defaults if nothing was saved yet.
    async fn load(&self) -> Result<Settings, StoreError>;

    async fn save(&self, settings: &Settings) -> Result<(), StoreError>;

    /// Completion history, newest first.
    async fn load_history(&self) -> Result<Vec<CompletionEntry>, StoreError> {
        Ok(Vec::new())
    }

    async fn save_history(&self, _entries: &[CompletionEntry]) -> Result<(), StoreError> {
        Ok(())
    }
}
