//! Application-level message model
//!
//! The decrypted, persisted form of a message. Envelopes are the wire
//! shape; `Message` is what history and the UI see.

use serde::{Deserialize, Serialize};

use crate::types::{MessageId, PeerId, Timestamp};

// ----------------------------------------------------------------------------
// Direction and Status
// ----------------------------------------------------------------------------

/// Whether the local node sent or received a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    Sent,
    Received,
}

/// Delivery state of a sent message.
///
/// A message record mutates at most once: `Pending` to either `Delivered`
/// or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Delivered,
    Failed,
}

// ----------------------------------------------------------------------------
// Message
// ----------------------------------------------------------------------------

/// One message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Random 128-bit identifier, shared with the wire envelope
    pub id: MessageId,
    /// The peer the conversation belongs to: recipient when sent,
    /// sender when received
    pub peer_id: PeerId,
    /// Plaintext, at most 500 Unicode scalar values
    pub text: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: Timestamp,
    pub direction: MessageDirection,
    /// Present only on the sent direction
    pub status: Option<MessageStatus>,
}

impl Message {
    /// Create an outbound message record in its initial pending state
    pub fn outbound(id: MessageId, recipient: PeerId, text: String, timestamp: Timestamp) -> Self {
        Self {
            id,
            peer_id: recipient,
            text,
            timestamp,
            direction: MessageDirection::Sent,
            status: Some(MessageStatus::Pending),
        }
    }

    /// Create an inbound message record
    pub fn inbound(id: MessageId, sender: PeerId, text: String, timestamp: Timestamp) -> Self {
        Self {
            id,
            peer_id: sender,
            text,
            timestamp,
            direction: MessageDirection::Received,
            status: None,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_starts_pending() {
        let msg = Message::outbound(
            MessageId::random(),
            PeerId::new("peer-1"),
            "hello".to_string(),
            Timestamp::new(1_700_000_000_000),
        );
        assert_eq!(msg.direction, MessageDirection::Sent);
        assert_eq!(msg.status, Some(MessageStatus::Pending));
    }

    #[test]
    fn test_inbound_carries_no_status() {
        let msg = Message::inbound(
            MessageId::random(),
            PeerId::new("peer-1"),
            "hi".to_string(),
            Timestamp::new(1_700_000_000_000),
        );
        assert_eq!(msg.direction, MessageDirection::Received);
        assert_eq!(msg.status, None);
    }
}
