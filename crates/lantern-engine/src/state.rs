//! Engine state and the synchronous halves of the message paths
//!
//! Everything here runs without awaiting: input validation, envelope
//! composition, duplicate gating, and decrypt resolution. The engine task
//! owns one [`EngineState`] and drives the async edges (transport writes,
//! persistence, event emission) around these methods.

use tracing::debug;

use lantern_core::crypto::{self, Identity};
use lantern_core::dedup::DuplicateCache;
use lantern_core::envelope::PROTOCOL_VERSION;
use lantern_core::{
    wire, EngineConfig, Message, MessageEnvelope, MessageId, PeerCrypto, PeerId, PeerTable,
    SendError, SystemTimeSource, Timestamp, Ttl,
};

// ----------------------------------------------------------------------------
// Engine Statistics
// ----------------------------------------------------------------------------

/// Counters exposed through the handle for observability
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub envelopes_relayed: u64,
    pub duplicates_dropped: u64,
    pub decode_failures: u64,
    pub decrypt_failures: u64,
    pub send_failures: u64,
    pub retries_attempted: u64,
}

// ----------------------------------------------------------------------------
// Inbound Disposition
// ----------------------------------------------------------------------------

/// What the engine task must do with an inbound envelope
#[derive(Debug)]
pub enum InboundAction {
    /// Decrypted for us: persist, emit, and relay if the hop budget allows
    Deliver {
        message: Message,
        relay: Option<MessageEnvelope>,
    },
    /// Not decryptable here; the node acts as a forwarder only
    RelayOnly { relay: MessageEnvelope },
    /// Malformed, duplicate, or spent: nothing to do
    Drop,
}

// ----------------------------------------------------------------------------
// Engine State
// ----------------------------------------------------------------------------

/// State owned exclusively by the engine task
pub struct EngineState {
    pub config: EngineConfig,
    pub identity: Identity,
    pub peers: PeerTable,
    pub dedup: DuplicateCache,
    pub stats: EngineStats,
    pub clock: SystemTimeSource,
}

impl EngineState {
    pub fn new(
        config: EngineConfig,
        identity: Identity,
        peers: PeerTable,
        dedup: DuplicateCache,
    ) -> Self {
        Self {
            config,
            identity,
            peers,
            dedup,
            stats: EngineStats::default(),
            clock: SystemTimeSource,
        }
    }

    /// Validate, resolve, and encrypt an outbound message.
    ///
    /// Marks the fresh message id as processed so the node never relays
    /// its own envelope when a neighbor floods it back.
    pub fn compose_outbound(
        &mut self,
        recipient: &PeerId,
        text: &str,
    ) -> Result<(MessageEnvelope, Message), SendError> {
        if text.is_empty() {
            return Err(SendError::EmptyMessage);
        }
        let length = text.chars().count();
        if length > self.config.max_text_len {
            return Err(SendError::TooLong {
                length,
                limit: self.config.max_text_len,
            });
        }

        let record = self
            .peers
            .get(recipient)
            .ok_or_else(|| SendError::UnknownPeer(recipient.clone()))?;
        let (public_key, shared_secret) = match &record.crypto {
            PeerCrypto::Keyed {
                public_key,
                shared_secret,
            } => (*public_key, *shared_secret),
            _ => return Err(SendError::NoSharedSecret(recipient.clone())),
        };

        let message_id = MessageId::random();
        let timestamp = Timestamp::now();
        let sealed = crypto::encrypt(text.as_bytes(), &shared_secret)?;

        let envelope = MessageEnvelope {
            version: PROTOCOL_VERSION,
            message_id,
            sender_id: self.identity.sender_id(),
            recipient_id: crypto::derive_sender_id(&public_key),
            timestamp,
            ttl: Ttl::new(self.config.default_ttl),
            nonce: sealed.nonce.to_vec(),
            tag: sealed.tag.to_vec(),
            ciphertext: sealed.ciphertext,
        };
        let message = Message::outbound(message_id, recipient.clone(), text.to_string(), timestamp);

        self.dedup.mark_processed(message_id);
        Ok((envelope, message))
    }

    /// Gate, resolve, and decrypt an inbound envelope.
    ///
    /// Malformed bytes and duplicates are dropped silently; a message we
    /// cannot decrypt still relays while its hop budget lasts -- this node
    /// is simply not the recipient.
    pub fn process_inbound(&mut self, from: &PeerId, bytes: &[u8]) -> InboundAction {
        let envelope = match wire::decode(bytes) {
            Ok(envelope) => envelope,
            Err(err) => {
                self.stats.decode_failures += 1;
                debug!(peer = %from, error = %err, "dropping undecodable envelope");
                return InboundAction::Drop;
            }
        };
        if let Err(err) = envelope.validate() {
            self.stats.decode_failures += 1;
            debug!(peer = %from, error = %err, "dropping invalid envelope");
            return InboundAction::Drop;
        }

        if self.dedup.is_duplicate(&envelope.message_id) {
            self.stats.duplicates_dropped += 1;
            debug!(id = %envelope.message_id.short(), "dropping duplicate envelope");
            return InboundAction::Drop;
        }
        self.dedup.mark_processed(envelope.message_id);

        let relay = envelope.relay_hop();

        // Prefer the peer whose bound key matches the envelope's sender id;
        // the transport-level inbound address is only a fallback, since the
        // envelope may have arrived through a relay.
        let resolved = self
            .peers
            .lookup_by_sender_id(&envelope.sender_id)
            .unwrap_or_else(|| from.clone());

        let opened = match self.peers.shared_secret(&resolved) {
            Some(key) => {
                match crypto::decrypt(&envelope.ciphertext, &envelope.nonce, &envelope.tag, &key) {
                    Ok(plaintext) => Some(plaintext),
                    Err(err) => {
                        debug!(id = %envelope.message_id.short(), error = %err,
                            "envelope not decryptable here");
                        None
                    }
                }
            }
            None => {
                debug!(id = %envelope.message_id.short(), sender = %envelope.sender_id,
                    "no shared secret for envelope sender");
                None
            }
        };

        match opened {
            Some(plaintext) => match String::from_utf8(plaintext) {
                Ok(text) => {
                    let message =
                        Message::inbound(envelope.message_id, resolved, text, envelope.timestamp);
                    self.stats.messages_received += 1;
                    InboundAction::Deliver { message, relay }
                }
                Err(_) => {
                    self.stats.decrypt_failures += 1;
                    debug!(id = %envelope.message_id.short(), "plaintext is not valid utf-8");
                    match relay {
                        Some(relay) => InboundAction::RelayOnly { relay },
                        None => InboundAction::Drop,
                    }
                }
            },
            None => {
                self.stats.decrypt_failures += 1;
                match relay {
                    Some(relay) => InboundAction::RelayOnly { relay },
                    None => InboundAction::Drop,
                }
            }
        }
    }

    /// Compare a scanned fingerprint against a peer's bound key and record
    /// the trust decision when it matches
    pub fn verify_peer(&mut self, peer_id: &PeerId, scanned: &str) -> bool {
        let Some(public_key) = self
            .peers
            .get(peer_id)
            .and_then(|record| record.crypto.public_key().copied())
        else {
            return false;
        };
        let matched = crypto::verify_fingerprint(scanned, &public_key);
        if matched {
            self.peers.set_verified(peer_id, true);
        }
        matched
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
