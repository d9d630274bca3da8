//! Duplicate detection for mesh flooding
//!
//! Every node relays each envelope at most once. The cache remembers
//! recently processed message ids with their insertion time; entries expire
//! after five minutes and the table is soft-bounded so a flood of unique
//! ids cannot grow memory without bound.

use std::collections::HashMap;

use tracing::debug;

use crate::types::{MessageId, SystemTimeSource, TimeSource, Timestamp};

/// Entry lifetime in milliseconds
pub const DEDUP_TTL_MS: u64 = 300_000;

/// Soft capacity; oldest entries are evicted once exceeded
pub const DEDUP_CAPACITY: usize = 1_000;

// ----------------------------------------------------------------------------
// Duplicate Cache
// ----------------------------------------------------------------------------

/// Time-expiring set of recently seen message ids
pub struct DuplicateCache<T: TimeSource = SystemTimeSource> {
    entries: HashMap<MessageId, Timestamp>,
    ttl_ms: u64,
    capacity: usize,
    clock: T,
}

impl DuplicateCache<SystemTimeSource> {
    /// Create a cache on the system clock with the default limits
    pub fn new() -> Self {
        Self::with_clock(SystemTimeSource)
    }
}

impl Default for DuplicateCache<SystemTimeSource> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeSource> DuplicateCache<T> {
    /// Create a cache with a custom clock and the default limits
    pub fn with_clock(clock: T) -> Self {
        Self::with_limits(clock, DEDUP_TTL_MS, DEDUP_CAPACITY)
    }

    /// Create a cache with explicit limits
    pub fn with_limits(clock: T, ttl_ms: u64, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl_ms,
            capacity,
            clock,
        }
    }

    /// Has this message id been processed within the entry lifetime?
    /// Pure lookup; never mutates the table.
    pub fn is_duplicate(&self, id: &MessageId) -> bool {
        let now = self.clock.now();
        self.entries
            .get(id)
            .is_some_and(|inserted| now.millis_since(*inserted) < self.ttl_ms)
    }

    /// Record a message id as processed.
    ///
    /// Re-marking a present id refreshes its timestamp without growing the
    /// table. Every call sweeps expired entries and enforces the capacity
    /// bound, evicting oldest-first.
    pub fn mark_processed(&mut self, id: MessageId) {
        let now = self.clock.now();
        self.entries.insert(id, now);
        self.prune_at(now);
        self.enforce_capacity();
    }

    /// Sweep all expired entries
    pub fn prune(&mut self) {
        self.prune_at(self.clock.now());
    }

    fn prune_at(&mut self, now: Timestamp) {
        let ttl_ms = self.ttl_ms;
        self.entries
            .retain(|_, inserted| now.millis_since(*inserted) < ttl_ms);
    }

    fn enforce_capacity(&mut self) {
        if self.entries.len() <= self.capacity {
            return;
        }
        let excess = self.entries.len() - self.capacity;
        let mut by_age: Vec<(MessageId, Timestamp)> =
            self.entries.iter().map(|(id, ts)| (*id, *ts)).collect();
        by_age.sort_by_key(|(_, ts)| *ts);
        for (id, _) in by_age.into_iter().take(excess) {
            self.entries.remove(&id);
        }
        debug!(evicted = excess, "duplicate cache over capacity");
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are present
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries for persistence across a restart
    pub fn snapshot(&self) -> Vec<(MessageId, Timestamp)> {
        self.entries.iter().map(|(id, ts)| (*id, *ts)).collect()
    }

    /// Reload persisted entries, discarding anything already expired
    pub fn restore(&mut self, entries: Vec<(MessageId, Timestamp)>) {
        let now = self.clock.now();
        for (id, inserted) in entries {
            if now.millis_since(inserted) < self.ttl_ms {
                self.entries.insert(id, inserted);
            }
        }
        self.enforce_capacity();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
