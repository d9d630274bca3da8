//! The Lantern wire envelope
//!
//! One envelope wraps one encrypted message plus the routing metadata the
//! mesh needs: content-addressed sender/recipient ids, a timestamp, and the
//! TTL hop budget. Envelopes are ephemeral -- built on send or relay,
//! discarded after transmission, never persisted.

use crate::errors::CodecError;
use crate::types::{MessageId, SenderId, Timestamp, Ttl};

// ----------------------------------------------------------------------------
// Wire Limits
// ----------------------------------------------------------------------------

/// Only protocol version currently spoken
pub const PROTOCOL_VERSION: u8 = 1;

/// Fixed header size: version + message id + sender + recipient + timestamp + ttl
pub const FIXED_HEADER_LEN: usize = 1 + MessageId::LEN + SenderId::LEN + SenderId::LEN + 8 + 1;

/// Smallest possible encoding: fixed header plus three empty length-prefixed fields
pub const MIN_ENVELOPE_LEN: usize = FIXED_HEADER_LEN + 2 + 2 + 4;

/// Upper bound on the nonce field
pub const MAX_NONCE_LEN: usize = 1_024;

/// Upper bound on the authentication tag field
pub const MAX_TAG_LEN: usize = 1_024;

/// Upper bound on the ciphertext field (10 MiB)
pub const MAX_PAYLOAD_LEN: usize = 10 * 1024 * 1024;

// ----------------------------------------------------------------------------
// Message Envelope
// ----------------------------------------------------------------------------

/// The wire record wrapping one encrypted message.
///
/// Serialized layout, all integers big-endian:
///
/// ```text
/// version (1) | message_id (16) | sender_id (8) | recipient_id (8) |
/// timestamp (8, u64) | ttl (1) | nonce_len (2, u16) | nonce |
/// tag_len (2, u16) | tag | payload_len (4, u32) | ciphertext
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEnvelope {
    pub version: u8,
    pub message_id: MessageId,
    pub sender_id: SenderId,
    pub recipient_id: SenderId,
    pub timestamp: Timestamp,
    pub ttl: Ttl,
    pub nonce: Vec<u8>,
    pub tag: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

impl MessageEnvelope {
    /// Check the structural invariants shared by the encoder and the
    /// receive path's semantic gate.
    pub fn validate(&self) -> Result<(), CodecError> {
        if self.version != PROTOCOL_VERSION {
            return Err(CodecError::UnsupportedVersion(self.version));
        }
        if self.nonce.len() > MAX_NONCE_LEN {
            return Err(CodecError::FieldTooLarge {
                field: "nonce",
                len: self.nonce.len(),
                max: MAX_NONCE_LEN,
            });
        }
        if self.tag.len() > MAX_TAG_LEN {
            return Err(CodecError::FieldTooLarge {
                field: "tag",
                len: self.tag.len(),
                max: MAX_TAG_LEN,
            });
        }
        if self.ciphertext.len() > MAX_PAYLOAD_LEN {
            return Err(CodecError::FieldTooLarge {
                field: "payload",
                len: self.ciphertext.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        Ok(())
    }

    /// Exact length of this envelope's encoding
    pub fn encoded_len(&self) -> usize {
        MIN_ENVELOPE_LEN + self.nonce.len() + self.tag.len() + self.ciphertext.len()
    }

    /// Copy of this envelope with the TTL spent by one relay hop.
    /// Returns None once the hop budget is exhausted.
    pub fn relay_hop(&self) -> Option<Self> {
        let ttl = self.ttl.decrement()?;
        Some(Self {
            ttl,
            ..self.clone()
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
