//! The engine task and its state transitions.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::EngineDeps;
use super::events::EngineEvent;
use super::handle::ControlRequest;
use crate::config::EngineConfig;
use crate::executor::PayloadTemplate;
use crate::feed::{FeedWatcher, Observation, ObservationKind};
use crate::model::{ItemId, Settings, Stats, StatusSnapshot};
use crate::pipeline::gates::{Candidate, Eligibility, IgnoreReason, Verdict, is_interfered};
use crate::pipeline::history::{CompletionEntry, CompletionLog};
use crate::scheduler::{ActionOutcome, CooldownPolicy, DispatchQueue, PendingAction, SlotSignal};

pub(super) struct EngineActor {
    pub(super) session_id: Uuid,
    pub(super) config: EngineConfig,
    pub(super) deps: EngineDeps,
    pub(super) gates: Eligibility,
    pub(super) completions: CompletionLog,
    pub(super) cooldown: CooldownPolicy,
    pub(super) template: PayloadTemplate,
    pub(super) queue: DispatchQueue,
    pub(super) settings: Settings,
    pub(super) stats: Stats,
    pub(super) paused: bool,
    pub(super) signal_tx: mpsc::UnboundedSender<SlotSignal>,
    pub(super) events: broadcast::Sender<EngineEvent>,
}

impl EngineActor {
    pub(super) async fn run(
        mut self,
        mut watcher: FeedWatcher,
        mut control_rx: mpsc::Receiver<ControlRequest>,
        mut signal_rx: mpsc::UnboundedReceiver<SlotSignal>,
    ) {
        // A zero interval turns periodic stats off; state changes still publish.
        let mut ticker = (!self.config.stats_interval.is_zero()).then(|| {
            let mut ticker = tokio::time::interval(self.config.stats_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        let mut feed_open = true;

        loop {
            tokio::select! {
                observation = watcher.next(), if feed_open => match observation {
                    Some(observation) => self.on_observation(observation).await,
                    None => {
                        warn!("Feed stream ended, engine keeps serving control requests");
                        feed_open = false;
                    }
                },

                Some(signal) = signal_rx.recv() => self.on_signal(signal).await,

                request = control_rx.recv() => match request {
                    Some(ControlRequest::Shutdown { reply }) => {
                        self.teardown();
                        let _ = reply.send(());
                        break;
                    }
                    Some(request) => self.on_control(request).await,
                    None => {
                        debug!("All engine handles dropped");
                        self.teardown();
                        break;
                    }
                },

                _ = tick(&mut ticker) => self.publish_stats(),
            }
        }
    }

    // ── Feed ────────────────────────────────────────────────────────────

    async fn on_observation(&mut self, observation: Observation) {
        match observation.kind {
            ObservationKind::Inserted => {
                self.evaluate_new(observation.id, observation.detected_at)
                    .await
            }
            ObservationKind::Changed => self.check_interference(observation.id).await,
        }
        self.publish_stats();
    }

    async fn evaluate_new(&mut self, id: ItemId, detected_at: Instant) {
        if !self.gates.admit(id) {
            debug!(item_id = id, watermark = ?self.gates.watermark(), "Item at or below watermark");
            return;
        }
        if self.paused {
            debug!(item_id = id, "Paused, item not evaluated");
            return;
        }

        self.stats.evaluated += 1;
        let verdict = match self.deps.feed.inspect(id).await {
            Some(item) => {
                self.gates
                    .classify(item, detected_at, &self.completions, &self.settings)
            }
            None => Verdict::Ignored(IgnoreReason::Vanished),
        };
        verdict.count(&mut self.stats);

        match verdict {
            Verdict::Accepted(candidate) => {
                info!(item_id = id, tag = candidate.tag, author = %candidate.item.author, "Item accepted");
                if self.queue.is_idle() {
                    self.dispatch(candidate);
                } else {
                    self.queue.enqueue(candidate);
                }
            }
            Verdict::Ignored(reason) => info!(item_id = id, %reason, "Item ignored"),
            other => debug!(item_id = id, verdict = other.label(), "Item skipped"),
        }
    }

    /// A change on the waiting item may be a foreign reaction: preempt it.
    async fn check_interference(&mut self, id: ItemId) {
        if self.queue.waiting_item_id() != Some(id) {
            return;
        }
        let interfered = match self.deps.feed.inspect(id).await {
            Some(item) => is_interfered(&item, &self.completions),
            None => true,
        };
        if interfered && self.queue.cancel_waiting().is_some() {
            self.preempted(id);
            self.drain().await;
        }
    }

    fn preempted(&mut self, id: ItemId) {
        self.stats.ignored_by_policy += 1;
        info!(item_id = id, "Cooldown preempted by foreign reaction");
        self.emit(EngineEvent::Preempted { item_id: id });
    }

    // ── Dispatch ────────────────────────────────────────────────────────

    /// Put an accepted item into the idle slot: wait out its cooldown or run it now.
    fn dispatch(&mut self, candidate: Candidate) {
        let id = candidate.id();
        let remaining =
            self.cooldown
                .remaining(&candidate.item.author, candidate.detected_at, Instant::now());

        match remaining {
            Some(delay) => {
                let ticket = self.queue.next_ticket();
                let remaining_ms = millis(delay);
                info!(item_id = id, remaining_ms, "Waiting for author cooldown");
                self.queue.begin_wait(PendingAction::schedule(
                    candidate,
                    delay,
                    ticket,
                    self.signal_tx.clone(),
                ));
                self.emit(EngineEvent::Waiting {
                    item_id: id,
                    remaining_ms,
                });
            }
            None => self.execute(candidate),
        }
    }

    fn execute(&mut self, candidate: Candidate) {
        let ticket = self.queue.next_ticket();
        let payload =
            self.template
                .render(&candidate.item, candidate.tag, candidate.contact.as_deref());
        let executor = Arc::clone(&self.deps.executor);
        let item = candidate.item.clone();
        let timeout = self.config.action_timeout;
        let signals = self.signal_tx.clone();

        info!(
            item_id = item.id,
            executor = executor.name(),
            payload = %payload.text,
            "Dispatching action"
        );

        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(timeout, executor.perform(&item, &payload)).await
            {
                Ok(true) => ActionOutcome::Completed,
                Ok(false) => ActionOutcome::Rejected,
                Err(_) => ActionOutcome::TimedOut,
            };
            let _ = signals.send(SlotSignal::ActionFinished { ticket, outcome });
        });

        self.queue.begin_execute(ticket, candidate);
    }

    async fn on_signal(&mut self, signal: SlotSignal) {
        match signal {
            SlotSignal::CooldownElapsed { ticket } => {
                let Some(candidate) = self.queue.take_waiting(ticket) else {
                    return;
                };
                let id = candidate.id();
                match self.revalidate(candidate).await {
                    Ok(candidate) => self.execute(candidate),
                    Err(IgnoreReason::Interference) => self.preempted(id),
                    Err(reason) => {
                        self.stats.ignored_by_policy += 1;
                        info!(item_id = id, %reason, "Item no longer eligible after cooldown");
                    }
                }
            }
            SlotSignal::ActionFinished { ticket, outcome } => {
                let Some(candidate) = self.queue.take_executing(ticket) else {
                    return;
                };
                match outcome {
                    ActionOutcome::Completed => self.record_completion(candidate).await,
                    ActionOutcome::Rejected | ActionOutcome::TimedOut => {
                        let reason = match outcome {
                            ActionOutcome::TimedOut => "timed out",
                            _ => "action surface not ready",
                        };
                        warn!(item_id = candidate.id(), reason, "Action failed, not recorded");
                        self.emit(EngineEvent::ActionFailed {
                            item_id: candidate.id(),
                            reason: reason.to_string(),
                        });
                    }
                }
            }
        }

        self.drain().await;
        self.publish_stats();
    }

    /// Re-run the deterministic gates against a fresh snapshot.
    async fn revalidate(&self, candidate: Candidate) -> Result<Candidate, IgnoreReason> {
        let item = self
            .deps
            .feed
            .inspect(candidate.id())
            .await
            .ok_or(IgnoreReason::Vanished)?;
        let (tag, contact) = self.gates.screen(&item, &self.completions)?;
        Ok(Candidate {
            item,
            tag,
            contact,
            detected_at: candidate.detected_at,
        })
    }

    /// Feed the idle slot from the backlog until something occupies it.
    async fn drain(&mut self) {
        while !self.paused && self.queue.is_idle() {
            let Some(candidate) = self.queue.pop_backlog() else {
                break;
            };
            let id = candidate.id();
            match self.revalidate(candidate).await {
                Ok(candidate) => {
                    debug!(item_id = id, remaining = self.queue.backlog_len(), "Draining backlog");
                    self.dispatch(candidate);
                }
                Err(reason) => {
                    self.stats.ignored_by_policy += 1;
                    info!(item_id = id, %reason, "Backlog item no longer eligible");
                }
            }
        }
    }

    async fn record_completion(&mut self, candidate: Candidate) {
        let key = candidate.dedup_key();
        let Candidate {
            item, tag, contact, ..
        } = candidate;
        let payload = self.template.render(&item, tag, contact.as_deref());

        let completed_at = Utc::now();
        self.completions.record(CompletionEntry {
            item_id: item.id,
            tag,
            contact: contact.clone(),
            key,
            completed_at,
        });
        self.stats.acted_on += 1;
        info!(item_id = item.id, tag, acted_on = self.stats.acted_on, "Action completed");

        self.emit(EngineEvent::Acted {
            item_id: item.id,
            tag,
            contact,
            author: item.author,
            text: item.text,
            payload: payload.text,
            at: completed_at,
        });

        if let Err(e) = self.deps.store.save_history(&self.completions.entries()).await {
            warn!(error = %e, "Failed to persist completion history");
        }

        if self.settings.auto_pause_after_action {
            info!("Auto-pausing after action");
            self.set_paused(true);
        }
    }

    // ── Control ─────────────────────────────────────────────────────────

    async fn on_control(&mut self, request: ControlRequest) {
        match request {
            ControlRequest::Pause { reply } => {
                if self.set_paused(true) {
                    self.publish_stats();
                }
                let _ = reply.send(self.status());
            }
            ControlRequest::Resume { reply } => {
                if self.set_paused(false) {
                    self.drain().await;
                    self.publish_stats();
                }
                let _ = reply.send(self.status());
            }
            ControlRequest::ApplySettings { patch, reply } => {
                let result = match self.settings.apply(&patch) {
                    Ok(()) => {
                        info!(
                            log_level = u8::from(self.settings.log_level),
                            probability = self.settings.action_probability,
                            auto_pause = self.settings.auto_pause_after_action,
                            "Settings updated"
                        );
                        if let Err(e) = self.deps.store.save(&self.settings).await {
                            warn!(error = %e, "Failed to persist settings");
                        }
                        self.emit(EngineEvent::SettingsUpdated {
                            settings: self.settings.clone(),
                        });
                        self.publish_stats();
                        Ok(self.status())
                    }
                    Err(e) => {
                        warn!(error = %e, "Settings update rejected");
                        Err(e)
                    }
                };
                let _ = reply.send(result);
            }
            ControlRequest::Status { reply } => {
                let _ = reply.send(self.status());
            }
            ControlRequest::Shutdown { reply } => {
                // Handled by the run loop.
                let _ = reply.send(());
            }
        }
    }

    /// Returns whether the flag actually changed.
    fn set_paused(&mut self, paused: bool) -> bool {
        if self.paused == paused {
            debug!(paused, "Pause state unchanged");
            return false;
        }
        self.paused = paused;
        if paused && let Some(candidate) = self.queue.cancel_waiting() {
            info!(item_id = candidate.id(), "Cooldown wait cancelled by pause");
        }
        info!(paused, "Pause state changed");
        self.emit(EngineEvent::StatusUpdate { paused });
        true
    }

    fn teardown(&mut self) {
        if let Some(candidate) = self.queue.cancel_waiting() {
            debug!(item_id = candidate.id(), "Cooldown wait cancelled on shutdown");
        }
        info!(session = %self.session_id, acted_on = self.stats.acted_on, "Engine stopped");
    }

    // ── Status ──────────────────────────────────────────────────────────

    fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            session_id: self.session_id,
            paused: self.paused,
            waiting_for_cooldown: self.queue.waiting_item_id().is_some(),
            pending_item_id: self.queue.pending_item_id(),
            cooldown_remaining_ms: self.queue.cooldown_remaining(Instant::now()).map(millis),
            backlog_len: self.queue.backlog_len(),
            stats: self.stats,
            baseline: self.gates.baseline(),
            watermark: self.gates.watermark(),
            settings: self.settings.clone(),
        }
    }

    fn publish_stats(&self) {
        self.emit(EngineEvent::Stats {
            status: self.status(),
        });
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
