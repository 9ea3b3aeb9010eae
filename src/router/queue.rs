//! Outage queue - messages accepted while no provider could answer
//!
//! Entries carry a monotonically increasing sequence number. A router takes a
//! snapshot when composing the outbound prompt and, once a provider replies,
//! clears everything up to the snapshot's sequence. In the single-caller case
//! that empties the queue; with concurrent callers sharing a router, messages
//! appended after the snapshot were not part of the delivered context and are
//! kept.
//!
//! ```text
//!  push("a") push("b")        snapshot → [a, b] upto=2
//!  ┌───┬───┐                      │
//!  │ 1 │ 2 │  push("c") → ┌───┬───┬───┐
//!  └───┴───┘              │ 1 │ 2 │ 3 │
//!                         └───┴───┴───┘
//!                      clear_through(2) → ┌───┐
//!                                         │ 3 │
//!                                         └───┘
//! ```

use std::collections::VecDeque;

/// Messages captured for one outbound prompt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    /// Queued messages, oldest first
    pub messages: Vec<String>,
    /// Sequence number of the newest captured entry (None if empty)
    pub upto: Option<u64>,
}

impl QueueSnapshot {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// FIFO of raw message strings; append-only apart from `clear_through`
#[derive(Debug, Default)]
pub struct PendingQueue {
    entries: VecDeque<(u64, String)>,
    next_seq: u64,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, returning the new length
    pub fn push(&mut self, message: impl Into<String>) -> usize {
        self.next_seq += 1;
        self.entries.push_back((self.next_seq, message.into()));
        self.entries.len()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            messages: self.entries.iter().map(|(_, m)| m.clone()).collect(),
            upto: self.entries.back().map(|(seq, _)| *seq),
        }
    }

    /// Drop every entry captured by a snapshot, returning how many were removed
    pub fn clear_through(&mut self, upto: Option<u64>) -> usize {
        let Some(upto) = upto else {
            return 0;
        };
        let before = self.entries.len();
        while matches!(self.entries.front(), Some((seq, _)) if *seq <= upto) {
            self.entries.pop_front();
        }
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Messages, oldest first
    pub fn messages(&self) -> Vec<String> {
        self.entries.iter().map(|(_, m)| m.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_is_fifo() {
        let mut queue = PendingQueue::new();
        assert_eq!(queue.push("first"), 1);
        assert_eq!(queue.push("second"), 2);
        assert_eq!(queue.messages(), vec!["first", "second"]);
    }

    #[test]
    fn test_clear_through_snapshot_empties_queue() {
        let mut queue = PendingQueue::new();
        queue.push("first");
        queue.push("second");
        let snapshot = queue.snapshot();
        assert_eq!(queue.clear_through(snapshot.upto), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear_keeps_entries_appended_after_snapshot() {
        let mut queue = PendingQueue::new();
        queue.push("first");
        let snapshot = queue.snapshot();
        queue.push("late");

        queue.clear_through(snapshot.upto);
        assert_eq!(queue.messages(), vec!["late"]);
    }

    #[test]
    fn test_stale_snapshot_does_not_remove_newer_entries() {
        let mut queue = PendingQueue::new();
        queue.push("a");
        let stale = queue.snapshot();
        let fresh = queue.snapshot();

        // another caller succeeds first and clears
        queue.clear_through(fresh.upto);
        queue.push("b");

        assert_eq!(queue.clear_through(stale.upto), 0);
        assert_eq!(queue.messages(), vec!["b"]);
    }

    #[test]
    fn test_empty_snapshot_clears_nothing() {
        let mut queue = PendingQueue::new();
        let snapshot = queue.snapshot();
        assert!(snapshot.is_empty());
        queue.push("x");
        assert_eq!(queue.clear_through(snapshot.upto), 0);
        assert_eq!(queue.len(), 1);
    }
}
