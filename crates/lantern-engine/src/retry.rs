//! Send-retry queue
//!
//! Failed sends wait here with their already-serialized envelope bytes and
//! are retried from the engine tick with exponential backoff. Re-using the
//! original bytes keeps the message id stable, so peers that became
//! reachable between attempts suppress the duplicates themselves.
//!
//! The queue is memory-only: a process restart loses pending retries and
//! the affected messages remain `Pending` in history.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use lantern_core::{MessageId, PeerId};

// ----------------------------------------------------------------------------
// Retry Entry
// ----------------------------------------------------------------------------

/// One message awaiting retransmission
#[derive(Debug, Clone)]
pub struct RetryEntry {
    pub message_id: MessageId,
    /// Conversation the message belongs to, for the status update
    pub peer_id: PeerId,
    /// Original envelope bytes; same message id, same TTL
    pub envelope_bytes: Vec<u8>,
    /// Retry attempts already consumed
    pub attempts: u32,
    pub due: Instant,
}

// ----------------------------------------------------------------------------
// Retry Queue
// ----------------------------------------------------------------------------

/// In-memory queue of messages whose initial flood failed entirely
pub struct RetryQueue {
    base: Duration,
    max_retries: u32,
    entries: HashMap<MessageId, RetryEntry>,
}

impl RetryQueue {
    pub fn new(base: Duration, max_retries: u32) -> Self {
        Self {
            base,
            max_retries,
            entries: HashMap::new(),
        }
    }

    fn backoff(&self, attempts: u32) -> Duration {
        // base * 2^attempts, saturating on pathological attempt counts
        self.base
            .checked_mul(1u32 << attempts.min(16))
            .unwrap_or(Duration::MAX)
    }

    /// Queue a freshly failed send; the first retry is due after `base`
    pub fn enqueue(
        &mut self,
        message_id: MessageId,
        peer_id: PeerId,
        envelope_bytes: Vec<u8>,
        now: Instant,
    ) {
        let due = now + self.backoff(0);
        self.entries.insert(
            message_id,
            RetryEntry {
                message_id,
                peer_id,
                envelope_bytes,
                attempts: 0,
                due,
            },
        );
    }

    /// Remove and return every entry whose due time has passed
    pub fn take_due(&mut self, now: Instant) -> Vec<RetryEntry> {
        let due_ids: Vec<MessageId> = self
            .entries
            .values()
            .filter(|entry| entry.due <= now)
            .map(|entry| entry.message_id)
            .collect();
        due_ids
            .into_iter()
            .filter_map(|id| self.entries.remove(&id))
            .collect()
    }

    /// Put a failed retry back with one more attempt consumed.
    ///
    /// Returns false -- and drops the entry -- once the attempt budget is
    /// exhausted; the caller then marks the message failed.
    pub fn reschedule(&mut self, mut entry: RetryEntry, now: Instant) -> bool {
        entry.attempts += 1;
        if entry.attempts >= self.max_retries {
            return false;
        }
        entry.due = now + self.backoff(entry.attempts);
        self.entries.insert(entry.message_id, entry);
        true
    }

    /// Drop a pending retry, if present
    pub fn remove(&mut self, message_id: &MessageId) -> Option<RetryEntry> {
        self.entries.remove(message_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> RetryQueue {
        RetryQueue::new(Duration::from_secs(1), 3)
    }

    fn entry_ids(entries: &[RetryEntry]) -> Vec<MessageId> {
        entries.iter().map(|e| e.message_id).collect()
    }

    #[test]
    fn test_first_retry_due_after_base() {
        let mut queue = queue();
        let now = Instant::now();
        let id = MessageId::random();

        queue.enqueue(id, PeerId::new("peer-a"), vec![1, 2, 3], now);

        assert!(queue.take_due(now).is_empty());
        assert!(queue
            .take_due(now + Duration::from_millis(999))
            .is_empty());
        assert_eq!(entry_ids(&queue.take_due(now + Duration::from_secs(1))), vec![id]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let mut queue = queue();
        let t0 = Instant::now();
        let id = MessageId::random();
        queue.enqueue(id, PeerId::new("peer-a"), vec![], t0);

        // retry 1 due at t0+1s; fails and goes back with a 2s delay
        let t1 = t0 + Duration::from_secs(1);
        let entry = queue.take_due(t1).pop().unwrap();
        assert!(queue.reschedule(entry, t1));

        let t2 = t1 + Duration::from_secs(2);
        assert!(queue.take_due(t2 - Duration::from_millis(1)).is_empty());
        let entry = queue.take_due(t2).pop().unwrap();
        assert_eq!(entry.attempts, 1);

        // retry 2 fails; retry 3 due 4s later, at t0+7s
        assert!(queue.reschedule(entry, t2));
        let t3 = t2 + Duration::from_secs(4);
        let entry = queue.take_due(t3).pop().unwrap();
        assert_eq!(entry.attempts, 2);

        // a third failure exhausts the budget
        assert!(!queue.reschedule(entry, t3));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_take_due_leaves_future_entries() {
        let mut queue = queue();
        let now = Instant::now();
        let due = MessageId::random();
        let later = MessageId::random();

        queue.enqueue(due, PeerId::new("a"), vec![], now - Duration::from_secs(2));
        queue.enqueue(later, PeerId::new("b"), vec![], now);

        assert_eq!(entry_ids(&queue.take_due(now)), vec![due]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_remove_cancels_pending_retry() {
        let mut queue = queue();
        let id = MessageId::random();
        queue.enqueue(id, PeerId::new("a"), vec![], Instant::now());

        assert!(queue.remove(&id).is_some());
        assert!(queue.remove(&id).is_none());
    }

    #[test]
    fn test_reenqueue_replaces_existing_entry() {
        let mut queue = queue();
        let now = Instant::now();
        let id = MessageId::random();

        queue.enqueue(id, PeerId::new("a"), vec![1], now);
        queue.enqueue(id, PeerId::new("a"), vec![2], now);
        assert_eq!(queue.len(), 1);
    }
}
