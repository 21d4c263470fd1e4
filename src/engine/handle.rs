//! Control surface: the cloneable handle everything outside the engine talks to.

use tokio::sync::{broadcast, mpsc, oneshot};

use super::events::EngineEvent;
use crate::error::ControlError;
use crate::model::{SettingsPatch, StatusSnapshot};

/// Requests served by the engine task, each with its own reply channel.
#[derive(Debug)]
pub(crate) enum ControlRequest {
    Pause {
        reply: oneshot::Sender<StatusSnapshot>,
    },
    Resume {
        reply: oneshot::Sender<StatusSnapshot>,
    },
    ApplySettings {
        patch: SettingsPatch,
        reply: oneshot::Sender<Result<StatusSnapshot, ControlError>>,
    },
    Status {
        reply: oneshot::Sender<StatusSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cheap to clone. Every method is safe to call at any time relative to
/// in-flight processing; requests are serialized through the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<ControlRequest>,
    events: broadcast::Sender<EngineEvent>,
}

impl EngineHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<ControlRequest>,
        events: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self { tx, events }
    }

    /// Cancel any cooldown wait and stop draining the backlog. No-op if already paused.
    pub async fn pause(&self) -> Result<StatusSnapshot, ControlError> {
        self.request(|reply| ControlRequest::Pause { reply }).await
    }

    /// Clear the paused flag and resume draining. No-op if not paused.
    pub async fn resume(&self) -> Result<StatusSnapshot, ControlError> {
        self.request(|reply| ControlRequest::Resume { reply }).await
    }

    /// Merge a partial settings update. Takes effect from the next evaluation.
    pub async fn apply_settings(&self, patch: SettingsPatch) -> Result<StatusSnapshot, ControlError> {
        self.request(|reply| ControlRequest::ApplySettings { patch, reply })
            .await?
    }

    pub async fn status(&self) -> Result<StatusSnapshot, ControlError> {
        self.request(|reply| ControlRequest::Status { reply }).await
    }

    /// Subscribe to outbound events. Slow receivers lag and skip.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Stop the engine task. Any cooldown wait is cancelled.
    pub async fn shutdown(&self) -> Result<(), ControlError> {
        self.request(|reply| ControlRequest::Shutdown { reply }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ControlRequest,
    ) -> Result<T, ControlError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| ControlError::EngineStopped)?;
        rx.await.map_err(|_| ControlError::EngineStopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stopped_engine_reports_error() {
        let (tx, rx) = mpsc::channel(1);
        let (events, _) = broadcast::channel(4);
        drop(rx);
        let handle = EngineHandle::new(tx, events);
        assert!(matches!(handle.pause().await, Err(ControlError::EngineStopped)));
        assert!(matches!(handle.status().await, Err(ControlError::EngineStopped)));
    }

    #[tokio::test]
    async fn dropped_reply_reports_error() {
        let (tx, mut rx) = mpsc::channel(1);
        let (events, _) = broadcast::channel(4);
        let handle = EngineHandle::new(tx, events);

        tokio::spawn(async move {
            // Receive and drop without replying.
            let _ = rx.recv().await;
        });
        assert!(matches!(handle.resume().await, Err(ControlError::EngineStopped)));
    }
}
