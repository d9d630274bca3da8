//! Error types for the Lantern engine
//!
//! Per-domain error enums unified into the top-level [`LanternError`].
//! The propagation policy: malformed inbound bytes are never surfaced (the
//! receive path drops them silently and logs); only errors the application
//! can react to -- input validation and storage failures on the send path --
//! cross the public API.

use crate::types::PeerId;

// ----------------------------------------------------------------------------
// Codec Errors
// ----------------------------------------------------------------------------

/// Structural failures while encoding or decoding an envelope.
///
/// Never surfaced to the application on the receive path; a malformed
/// inbound envelope is dropped and logged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("input shorter than the fixed envelope header")]
    ShortHeader,
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    #[error("declared {field} length {declared} overruns remaining {remaining} bytes")]
    LengthOverrun {
        field: &'static str,
        declared: usize,
        remaining: usize,
    },
    #[error("consumed {consumed} bytes but input holds {input}")]
    LengthMismatch { consumed: usize, input: usize },
    #[error("{field} length {len} exceeds the wire limit {max}")]
    FieldTooLarge {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("ttl {0} outside the permitted range")]
    InvalidTtl(u8),
}

// ----------------------------------------------------------------------------
// Crypto Errors
// ----------------------------------------------------------------------------

/// Cryptographic failures.
///
/// On receive these only bypass local delivery -- the envelope is still
/// relayed. On send they indicate a key-management bug and are propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("authentication failed")]
    AuthFail,
    #[error("key must be 32 bytes, got {0}")]
    BadKeyLength(usize),
    #[error("nonce must be 24 bytes, got {0}")]
    BadNonceLength(usize),
    #[error("tag must be 16 bytes, got {0}")]
    BadTagLength(usize),
}

// ----------------------------------------------------------------------------
// Send Errors
// ----------------------------------------------------------------------------

/// Failures surfaced synchronously from the send API
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("message text is empty")]
    EmptyMessage,
    #[error("message is {length} characters, limit is {limit}")]
    TooLong { length: usize, limit: usize },
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),
    #[error("key exchange with {0} has not completed")]
    NoSharedSecret(PeerId),
    #[error("encryption failed: {0}")]
    Crypto(#[from] CryptoError),
    #[error("envelope encoding failed: {0}")]
    Codec(#[from] CodecError),
    #[error("storage failed: {0}")]
    Storage(#[from] StorageError),
    #[error("engine is shut down")]
    EngineClosed,
}

// ----------------------------------------------------------------------------
// Transport Errors
// ----------------------------------------------------------------------------

/// Failures reported by the transport layer
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("connection attempt to {0} timed out")]
    ConnectTimeout(PeerId),
    #[error("send to {peer_id} failed: {reason}")]
    SendFailed { peer_id: PeerId, reason: String },
    #[error("peer {0} is not connected")]
    NotConnected(PeerId),
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

// ----------------------------------------------------------------------------
// Storage Errors
// ----------------------------------------------------------------------------

/// Failures at the key-value persistence boundary
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("stored record for {key} is corrupt: {reason}")]
    CorruptRecord { key: String, reason: String },
    #[error("stored record for {key} has unsupported schema {schema}")]
    UnsupportedSchema { key: String, schema: u8 },
}

// ----------------------------------------------------------------------------
// Top-Level Error
// ----------------------------------------------------------------------------

/// Unified error type for the Lantern engine
#[derive(Debug, thiserror::Error)]
pub enum LanternError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("send error: {0}")]
    Send(#[from] SendError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),
}

pub type Result<T> = std::result::Result<T, LanternError>;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_the_peer() {
        let err = SendError::UnknownPeer(PeerId::new("aa:bb:cc"));
        assert!(err.to_string().contains("aa:bb:cc"));
    }

    #[test]
    fn test_codec_error_into_lantern_error() {
        let err: LanternError = CodecError::ShortHeader.into();
        assert!(matches!(err, LanternError::Codec(CodecError::ShortHeader)));
    }
}
