//! Author cooldown: defer actions on rate-limited authors.
//!
//! State machine for one accepted item: `Idle → Waiting → Fired | Preempted | Cancelled`.
//! `Waiting` is a spawned sleep guarded by a [`CancellationToken`]; the
//! engine owns the transitions out of it.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{SlotSignal, Ticket};
use crate::pipeline::gates::Candidate;

/// Which authors must wait, and for how long.
#[derive(Debug, Clone)]
pub struct CooldownPolicy {
    cooldown: Duration,
    everyone: bool,
    /// Lowercased author names.
    authors: HashSet<String>,
}

impl CooldownPolicy {
    /// `*` in `restricted` puts every author under the cooldown.
    pub fn new(cooldown: Duration, restricted: &[String]) -> Self {
        let everyone = restricted.iter().any(|a| a == "*");
        let authors = restricted
            .iter()
            .filter(|a| a.as_str() != "*")
            .map(|a| a.trim().to_lowercase())
            .collect();
        Self {
            cooldown,
            everyone,
            authors,
        }
    }

    pub fn applies_to(&self, author: &str) -> bool {
        self.everyone || self.authors.contains(&author.trim().to_lowercase())
    }

    /// Time left before acting on this author's item, `None` if it may run now.
    pub fn remaining(&self, author: &str, detected_at: Instant, now: Instant) -> Option<Duration> {
        if !self.applies_to(author) {
            return None;
        }
        let elapsed = now.saturating_duration_since(detected_at);
        let left = self.cooldown.saturating_sub(elapsed);
        (!left.is_zero()).then_some(left)
    }
}

/// The single deferred action. Exists only while a cooldown wait is active.
#[derive(Debug)]
pub struct PendingAction {
    pub candidate: Candidate,
    pub fire_at: Instant,
    pub ticket: Ticket,
    cancel: CancellationToken,
}

impl PendingAction {
    /// Start the timer. It reports [`SlotSignal::CooldownElapsed`] unless cancelled first.
    pub fn schedule(
        candidate: Candidate,
        delay: Duration,
        ticket: Ticket,
        signals: mpsc::UnboundedSender<SlotSignal>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let fire_at = Instant::now() + delay;

        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(ticket, "Cooldown timer cancelled");
                }
                _ = tokio::time::sleep_until(fire_at) => {
                    let _ = signals.send(SlotSignal::CooldownElapsed { ticket });
                }
            }
        });

        Self {
            candidate,
            fire_at,
            ticket,
            cancel,
        }
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.fire_at.saturating_duration_since(now)
    }

    /// Stop the timer and hand back the item.
    pub fn into_candidate(self) -> Candidate {
        self.cancel.cancel();
        self.candidate
    }
}
