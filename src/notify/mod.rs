//! Best-effort notifications about engine events.

pub mod telegram;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::EngineEvent;
use crate::error::NotifyError;

pub use telegram::TelegramNotifier;

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one event. Events a notifier does not care about are `Ok(())`.
    async fn notify(&self, event: &EngineEvent) -> Result<(), NotifyError>;
}

/// Writes notable events to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, event: &EngineEvent) -> Result<(), NotifyError> {
        match event {
            EngineEvent::Acted {
                item_id,
                tag,
                author,
                ..
            } => info!(item_id, tag, author = %author, "Notify: acted"),
            EngineEvent::Preempted { item_id } => info!(item_id, "Notify: preempted"),
            EngineEvent::ActionFailed { item_id, reason } => {
                info!(item_id, reason = %reason, "Notify: action failed")
            }
            EngineEvent::StatusUpdate { paused } => info!(paused, "Notify: status"),
            _ => {}
        }
        Ok(())
    }
}

/// Forward engine events to a notifier until the event channel closes.
/// Delivery failures are logged and dropped.
pub fn spawn_notifier(
    notifier: Arc<dyn Notifier>,
    mut rx: broadcast::Receiver<EngineEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = notifier.notify(&event).await {
                        warn!(notifier = notifier.name(), kind = event.kind(), error = %e, "Notification failed");
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(notifier = notifier.name(), missed = n, "Notifier lagged behind events");
                }
                Err(RecvError::Closed) => {
                    debug!(notifier = notifier.name(), "Event channel closed, notifier stopping");
                    break;
                }
            }
        }
    })
}
