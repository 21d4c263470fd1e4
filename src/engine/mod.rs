//! Detection-and-dispatch engine.
//!
//! One task owns all mutable state (watermark, dispatch slot, backlog,
//! settings, counters). Feed observations, timer/executor signals and
//! control requests are multiplexed into it, so every transition runs to
//! completion before the next one starts.

mod actor;
pub mod events;
pub mod handle;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::executor::{ActionExecutor, PayloadTemplate};
use crate::feed::{FeedSource, FeedWatcher};
use crate::pipeline::gates::Eligibility;
use crate::pipeline::history::CompletionLog;
use crate::scheduler::{CooldownPolicy, DispatchQueue};
use crate::store::SettingsStore;

use actor::EngineActor;
pub use events::EngineEvent;
pub use handle::EngineHandle;

const CONTROL_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 256;

/// External collaborators the engine is wired to.
#[derive(Clone)]
pub struct EngineDeps {
    pub feed: Arc<dyn FeedSource>,
    pub executor: Arc<dyn ActionExecutor>,
    pub store: Arc<dyn SettingsStore>,
}

pub struct Engine;

impl Engine {
    /// Load persisted state, compute the baseline and spawn the engine task.
    ///
    /// Store failures fall back to defaults. A feed that cannot be observed
    /// is the only startup error.
    pub async fn start(
        config: EngineConfig,
        deps: EngineDeps,
    ) -> Result<(EngineHandle, JoinHandle<()>)> {
        let settings = deps.store.load().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load settings, using defaults");
            Default::default()
        });
        let history = deps.store.load_history().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load completion history");
            Vec::new()
        });

        let watcher = FeedWatcher::start(deps.feed.as_ref()).await?;

        let gates = Eligibility::new(
            watcher.baseline(),
            config.reserved_tags.clone(),
            config.sampling,
            config.rng_seed,
        );
        let mut completions = CompletionLog::new(config.duplicate_history, config.duplicate_window);
        completions.restore(history);

        let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let session_id = Uuid::new_v4();
        info!(
            session = %session_id,
            baseline = ?watcher.baseline(),
            probability = settings.action_probability,
            restored = completions.len(),
            paused = config.start_paused,
            "Engine starting"
        );

        let actor = EngineActor {
            session_id,
            paused: config.start_paused,
            cooldown: CooldownPolicy::new(config.cooldown, &config.restricted_authors),
            template: PayloadTemplate::new(config.action_template.clone()),
            config,
            deps,
            gates,
            completions,
            queue: DispatchQueue::new(),
            settings,
            stats: Default::default(),
            signal_tx,
            events: events.clone(),
        };

        let join = tokio::spawn(actor.run(watcher, control_rx, signal_rx));
        Ok((EngineHandle::new(control_tx, events), join))
    }
}
