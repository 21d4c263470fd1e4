//! Cooldown scheduling and the single dispatch slot.

pub mod cooldown;
pub mod queue;

pub use cooldown::{CooldownPolicy, PendingAction};
pub use queue::DispatchQueue;

/// Sequence number for one occupancy of the dispatch slot. Signals carrying
/// a ticket that no longer matches the slot are stale and dropped.
pub type Ticket = u64;

/// How an executor call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed,
    /// The executor reported the action surface was not in the expected shape.
    Rejected,
    TimedOut,
}

/// Reports from spawned timer and executor tasks back to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotSignal {
    CooldownElapsed { ticket: Ticket },
    ActionFinished { ticket: Ticket, outcome: ActionOutcome },
}
