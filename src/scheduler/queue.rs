//! Dispatch queue: one slot, one FIFO backlog.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use super::Ticket;
use super::cooldown::PendingAction;
use crate::model::ItemId;
use crate::pipeline::gates::Candidate;

/// What occupies the single dispatch slot.
#[derive(Debug, Default)]
enum Slot {
    #[default]
    Idle,
    /// Cooldown timer running.
    Waiting(PendingAction),
    /// Executor call in flight.
    Executing { ticket: Ticket, candidate: Candidate },
}

/// Global single-concurrency gate plus the backlog of accepted items.
///
/// The queue only tracks occupancy. Starting timers and executor calls is
/// the engine's job, which hands the resulting state back through
/// [`DispatchQueue::begin_wait`] and [`DispatchQueue::begin_execute`].
#[derive(Debug, Default)]
pub struct DispatchQueue {
    slot: Slot,
    backlog: VecDeque<Candidate>,
    last_ticket: Ticket,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.slot, Slot::Idle)
    }

    /// Fresh ticket for the next occupancy.
    pub fn next_ticket(&mut self) -> Ticket {
        self.last_ticket += 1;
        self.last_ticket
    }

    /// Item in the slot, waiting or executing.
    pub fn pending_item_id(&self) -> Option<ItemId> {
        match &self.slot {
            Slot::Idle => None,
            Slot::Waiting(pending) => Some(pending.candidate.id()),
            Slot::Executing { candidate, .. } => Some(candidate.id()),
        }
    }

    /// Item whose cooldown is running.
    pub fn waiting_item_id(&self) -> Option<ItemId> {
        match &self.slot {
            Slot::Waiting(pending) => Some(pending.candidate.id()),
            _ => None,
        }
    }

    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        match &self.slot {
            Slot::Waiting(pending) => Some(pending.remaining(now)),
            _ => None,
        }
    }

    /// Park an accepted item behind the one in flight.
    pub fn enqueue(&mut self, candidate: Candidate) {
        debug_assert!(!self.is_idle(), "backlog grows only while the slot is occupied");
        info!(
            item_id = candidate.id(),
            behind = ?self.pending_item_id(),
            backlog = self.backlog.len() + 1,
            "Item queued behind in-flight action"
        );
        self.backlog.push_back(candidate);
    }

    /// Oldest backlog entry. Only valid while the slot is idle.
    pub fn pop_backlog(&mut self) -> Option<Candidate> {
        if !self.is_idle() {
            return None;
        }
        self.backlog.pop_front()
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn begin_wait(&mut self, pending: PendingAction) {
        debug_assert!(self.is_idle());
        self.slot = Slot::Waiting(pending);
    }

    pub fn begin_execute(&mut self, ticket: Ticket, candidate: Candidate) {
        debug_assert!(self.is_idle());
        self.slot = Slot::Executing { ticket, candidate };
    }

    /// Release a waiting slot whose timer fired. Stale tickets leave the slot alone.
    pub fn take_waiting(&mut self, ticket: Ticket) -> Option<Candidate> {
        match &self.slot {
            Slot::Waiting(pending) if pending.ticket == ticket => {}
            _ => {
                debug!(ticket, "Stale cooldown signal ignored");
                return None;
            }
        }
        match std::mem::take(&mut self.slot) {
            Slot::Waiting(pending) => Some(pending.into_candidate()),
            _ => None,
        }
    }

    /// Release an executing slot. Stale tickets leave the slot alone.
    pub fn take_executing(&mut self, ticket: Ticket) -> Option<Candidate> {
        match &self.slot {
            Slot::Executing { ticket: t, .. } if *t == ticket => {}
            _ => {
                debug!(ticket, "Stale action signal ignored");
                return None;
            }
        }
        match std::mem::take(&mut self.slot) {
            Slot::Executing { candidate, .. } => Some(candidate),
            _ => None,
        }
    }

    /// Cancel a running cooldown. No-op when nothing is waiting.
    pub fn cancel_waiting(&mut self) -> Option<Candidate> {
        if !matches!(self.slot, Slot::Waiting(_)) {
            return None;
        }
        match std::mem::take(&mut self.slot) {
            Slot::Waiting(pending) => Some(pending.into_candidate()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemSnapshot;
    use crate::scheduler::SlotSignal;
    use tokio::sync::mpsc;

    fn candidate(id: ItemId) -> Candidate {
        Candidate {
            item: ItemSnapshot::new(id, "[5]", "ann"),
            tag: 5,
            contact: None,
            detected_at: Instant::now(),
        }
    }

    fn wait(queue: &mut DispatchQueue, id: ItemId, tx: &mpsc::UnboundedSender<SlotSignal>) -> Ticket {
        let ticket = queue.next_ticket();
        let pending =
            PendingAction::schedule(candidate(id), Duration::from_secs(60), ticket, tx.clone());
        queue.begin_wait(pending);
        ticket
    }

    #[tokio::test]
    async fn backlog_is_fifo_and_blocked_while_busy() {
        let mut queue = DispatchQueue::new();
        let ticket = queue.next_ticket();
        queue.begin_execute(ticket, candidate(1));

        queue.enqueue(candidate(2));
        queue.enqueue(candidate(3));
        assert_eq!(queue.backlog_len(), 2);
        assert!(queue.pop_backlog().is_none());

        assert_eq!(queue.take_executing(ticket).map(|c| c.id()), Some(1));
        assert_eq!(queue.pop_backlog().map(|c| c.id()), Some(2));
        assert_eq!(queue.pop_backlog().map(|c| c.id()), Some(3));
        assert!(queue.pop_backlog().is_none());
    }

    #[tokio::test]
    async fn stale_tickets_do_not_release_slot() {
        let mut queue = DispatchQueue::new();
        let ticket = queue.next_ticket();
        queue.begin_execute(ticket, candidate(1));

        assert!(queue.take_executing(ticket + 1).is_none());
        assert!(queue.take_waiting(ticket).is_none());
        assert_eq!(queue.pending_item_id(), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_slot_reports_remaining() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut queue = DispatchQueue::new();
        wait(&mut queue, 4, &tx);

        assert_eq!(queue.waiting_item_id(), Some(4));
        assert_eq!(
            queue.cooldown_remaining(Instant::now()),
            Some(Duration::from_secs(60))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_waiting_is_idempotent() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut queue = DispatchQueue::new();
        wait(&mut queue, 4, &tx);

        assert_eq!(queue.cancel_waiting().map(|c| c.id()), Some(4));
        assert!(queue.is_idle());
        assert!(queue.cancel_waiting().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn tickets_increase() {
        let mut queue = DispatchQueue::new();
        let a = queue.next_ticket();
        let b = queue.next_ticket();
        assert!(b > a);
    }
}
