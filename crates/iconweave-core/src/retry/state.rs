//! Retry item state machine.

use serde::{Deserialize, Serialize};

/// State of one item in the retry queue.
///
/// State transitions:
/// - Queued -> Scheduled -> Attempted -> Settled
/// - Queued -> Scheduled -> Attempted -> Requeued -> Scheduled -> ... (until max_retries)
/// - Scheduled -> Settled (offline drain, no attempt consumed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RetryState {
    /// Just enqueued, no drain armed for it yet.
    Queued,

    /// A delayed drain is armed and will consider this item.
    Scheduled,

    /// Currently being re-attempted.
    Attempted,

    /// Failed again, back in the queue with attempt + 1.
    Requeued,

    /// Resolved or rejected; the caller has its answer.
    Settled,
}

impl RetryState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RetryState::Settled)
    }

    /// Waiting in the queue (eligible for the next tick).
    pub fn is_waiting(self) -> bool {
        matches!(
            self,
            RetryState::Queued | RetryState::Scheduled | RetryState::Requeued
        )
    }
}
