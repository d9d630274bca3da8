//! Core types for the Lantern protocol
//!
//! This module defines the fundamental identifier and time types used
//! throughout the engine, using newtype patterns for semantic validation
//! and type safety.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Peer Identifier
// ----------------------------------------------------------------------------

/// Opaque transport-layer address of a peer.
///
/// Stable for the duration of one connection; the same physical device may
/// reappear under a different `PeerId` after a reconnect. Never used inside
/// envelopes -- see [`SenderId`] for the wire-level identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    /// Create a new PeerId from a transport address
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Get the underlying address string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerId {
    fn from(address: &str) -> Self {
        Self(address.to_string())
    }
}

// ----------------------------------------------------------------------------
// Sender Identifier
// ----------------------------------------------------------------------------

/// Content-addressed peer identifier carried inside envelopes.
///
/// The first 8 bytes of the SHA-512 of an identity public key. Two nodes
/// must agree on this derivation for routing to interoperate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SenderId([u8; 8]);

impl SenderId {
    /// Wire size of a sender id
    pub const LEN: usize = 8;

    /// Create a new SenderId from 8 bytes
    pub fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

// ----------------------------------------------------------------------------
// Message Identifier
// ----------------------------------------------------------------------------

/// 128-bit random message identifier (UUID v4 on the wire as 16 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Wire size of a message id
    pub const LEN: usize = 16;

    /// Generate a fresh random id
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from raw wire bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Get the raw wire bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Short hex prefix for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0.as_bytes()[..4])
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Time-to-Live (TTL)
// ----------------------------------------------------------------------------

/// Hop budget for flood relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ttl(u8);

impl Ttl {
    /// Default hop budget for freshly composed envelopes
    pub const DEFAULT: Self = Self(10);

    /// Create a new TTL
    pub fn new(value: u8) -> Self {
        Self(value)
    }

    /// Get the raw value
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Decrement for a relay hop, returning None once the budget is spent.
    /// An envelope with TTL 0 is delivered locally but never relayed.
    pub fn decrement(self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }
}

impl Default for Ttl {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a timestamp from raw milliseconds
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as u64)
    }

    /// Get the raw milliseconds
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Milliseconds elapsed between `self` and an earlier timestamp
    pub fn millis_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

// ----------------------------------------------------------------------------
// Time Source
// ----------------------------------------------------------------------------

/// Source of wall-clock timestamps.
///
/// The duplicate cache and the engine take their notion of "now" from this
/// trait so that expiry behavior is testable with a manual clock.
pub trait TimeSource: Send + Sync {
    /// Get the current timestamp
    fn now(&self) -> Timestamp;
}

/// System clock implementation of [`TimeSource`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Manually advanced clock for tests
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    now: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

impl ManualTimeSource {
    /// Create a manual clock starting at the given millisecond timestamp
    pub fn starting_at(millis: u64) -> Self {
        Self {
            now: std::sync::Arc::new(std::sync::atomic::AtomicU64::new(millis)),
        }
    }

    /// Advance the clock by the given number of milliseconds
    pub fn advance(&self, millis: u64) {
        self.now
            .fetch_add(millis, std::sync::atomic::Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.now.load(std::sync::atomic::Ordering::SeqCst))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
