//! Peer directory
//!
//! The authoritative in-memory table of known peers with their connection,
//! key, and trust state. All mutation goes through methods here; external
//! consumers only ever see immutable snapshots.
//!
//! Per-peer progression: Discovered -> Connected -> KeysExchanged ->
//! Verified. Only `connected` moves backward; `verified` is cleared only
//! when a conflicting key binding replaces a prior one.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::crypto::{self, Identity};
use crate::storage::Storage;
use crate::types::{PeerId, SenderId, TimeSource, Timestamp};

// ----------------------------------------------------------------------------
// Peer Crypto State
// ----------------------------------------------------------------------------

/// Cryptographic state of a peer.
///
/// The variants make the invariant structural: a shared secret can only
/// exist alongside the public key it was agreed from.
#[derive(Clone, PartialEq, Eq)]
pub enum PeerCrypto {
    /// No key material yet
    None,
    /// Public key known, agreement not yet run
    Pub { public_key: [u8; 32] },
    /// Key exchange complete
    Keyed {
        public_key: [u8; 32],
        shared_secret: [u8; 32],
    },
}

impl PeerCrypto {
    /// The bound public key, if any
    pub fn public_key(&self) -> Option<&[u8; 32]> {
        match self {
            PeerCrypto::None => None,
            PeerCrypto::Pub { public_key } | PeerCrypto::Keyed { public_key, .. } => {
                Some(public_key)
            }
        }
    }

    /// The agreed shared secret, if key exchange has completed
    pub fn shared_secret(&self) -> Option<&[u8; 32]> {
        match self {
            PeerCrypto::Keyed { shared_secret, .. } => Some(shared_secret),
            _ => None,
        }
    }

    /// True once key exchange has completed
    pub fn is_keyed(&self) -> bool {
        matches!(self, PeerCrypto::Keyed { .. })
    }
}

impl std::fmt::Debug for PeerCrypto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerCrypto::None => write!(f, "None"),
            PeerCrypto::Pub { public_key } => f
                .debug_struct("Pub")
                .field("public_key", &hex::encode(public_key))
                .finish(),
            PeerCrypto::Keyed { public_key, .. } => f
                .debug_struct("Keyed")
                .field("public_key", &hex::encode(public_key))
                .finish_non_exhaustive(),
        }
    }
}

// ----------------------------------------------------------------------------
// Peer Record
// ----------------------------------------------------------------------------

/// One entry of the peer table
#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub peer_id: PeerId,
    pub crypto: PeerCrypto,
    pub connected: bool,
    pub verified: bool,
    pub rssi: Option<i8>,
    pub last_seen: Timestamp,
}

impl PeerRecord {
    fn new(peer_id: PeerId, last_seen: Timestamp) -> Self {
        Self {
            peer_id,
            crypto: PeerCrypto::None,
            connected: false,
            verified: false,
            rssi: None,
            last_seen,
        }
    }
}

/// Read-only view of a peer handed to external consumers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSnapshot {
    pub peer_id: PeerId,
    pub connected: bool,
    pub keys_exchanged: bool,
    pub verified: bool,
    /// Fingerprint of the bound public key, once known
    pub fingerprint: Option<String>,
    pub rssi: Option<i8>,
    pub last_seen: Timestamp,
}

// ----------------------------------------------------------------------------
// Peer Table
// ----------------------------------------------------------------------------

/// Directory of known peers, owned by the engine task
pub struct PeerTable {
    peers: HashMap<PeerId, PeerRecord>,
    storage: Arc<dyn Storage>,
}

impl PeerTable {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            peers: HashMap::new(),
            storage,
        }
    }

    /// Create-or-refresh a peer from a discovery callback
    pub fn upsert_discovered(&mut self, peer_id: PeerId, rssi: Option<i8>, clock: &dyn TimeSource) {
        let now = clock.now();
        let record = self
            .peers
            .entry(peer_id.clone())
            .or_insert_with(|| PeerRecord::new(peer_id, now));
        record.rssi = rssi;
        record.last_seen = now;
    }

    /// Bind a peer's identity public key received in-band.
    ///
    /// Runs key agreement and stores the shared secret. Re-binding the same
    /// key is a no-op; a conflicting key replaces the previous binding and
    /// clears `verified`, in memory and in storage.
    pub fn bind_public_key(
        &mut self,
        peer_id: &PeerId,
        public_key: [u8; 32],
        identity: &Identity,
        clock: &dyn TimeSource,
    ) {
        let now = clock.now();
        let record = self
            .peers
            .entry(peer_id.clone())
            .or_insert_with(|| PeerRecord::new(peer_id.clone(), now));

        match record.crypto.public_key().copied() {
            Some(existing) if existing == public_key => return,
            Some(_) => {
                debug!(peer = %peer_id, "replacing conflicting key binding");
                record.verified = false;
                if let Err(err) = self.storage.store_trust(peer_id, false) {
                    warn!(peer = %peer_id, error = %err, "failed to clear persisted trust");
                }
            }
            None => {
                // fresh binding: restore this peer's persisted trust decision
                record.verified = self.storage.load_trust(peer_id).unwrap_or_else(|err| {
                    warn!(peer = %peer_id, error = %err, "failed to load persisted trust");
                    false
                });
            }
        }

        let shared_secret = identity.agree(&public_key);
        record.crypto = PeerCrypto::Keyed {
            public_key,
            shared_secret,
        };
        record.last_seen = now;
        debug!(peer = %peer_id, sender_id = %crypto::derive_sender_id(&public_key),
            "key exchange complete");
    }

    /// Transport-level connection state change
    pub fn set_connected(&mut self, peer_id: &PeerId, connected: bool, clock: &dyn TimeSource) {
        let now = clock.now();
        let record = self
            .peers
            .entry(peer_id.clone())
            .or_insert_with(|| PeerRecord::new(peer_id.clone(), now));
        record.connected = connected;
        record.last_seen = now;
    }

    /// Persist an out-of-band trust decision.
    ///
    /// Returns false (and changes nothing) when the peer is unknown or has
    /// no bound public key -- trust is meaningless without a key to trust.
    pub fn set_verified(&mut self, peer_id: &PeerId, verified: bool) -> bool {
        let Some(record) = self.peers.get_mut(peer_id) else {
            return false;
        };
        if record.crypto.public_key().is_none() {
            return false;
        }
        record.verified = verified;
        if let Err(err) = self.storage.store_trust(peer_id, verified) {
            warn!(peer = %peer_id, error = %err, "failed to persist trust decision");
        }
        true
    }

    /// Find the peer whose bound public key hashes to the given sender id
    pub fn lookup_by_sender_id(&self, sender_id: &SenderId) -> Option<PeerId> {
        self.peers.values().find_map(|record| {
            let public_key = record.crypto.public_key()?;
            (crypto::derive_sender_id(public_key) == *sender_id).then(|| record.peer_id.clone())
        })
    }

    /// Remove a peer on explicit user command. Disconnects never remove.
    pub fn remove(&mut self, peer_id: &PeerId) -> Option<PeerRecord> {
        self.peers.remove(peer_id)
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<&PeerRecord> {
        self.peers.get(peer_id)
    }

    /// Shared secret for a peer, if key exchange has completed
    pub fn shared_secret(&self, peer_id: &PeerId) -> Option<[u8; 32]> {
        self.peers
            .get(peer_id)
            .and_then(|record| record.crypto.shared_secret())
            .copied()
    }

    /// Peers currently marked connected
    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.peers
            .values()
            .filter(|record| record.connected)
            .map(|record| record.peer_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Immutable snapshots for external consumers
    pub fn snapshot(&self) -> Vec<PeerSnapshot> {
        let mut snapshots: Vec<PeerSnapshot> = self
            .peers
            .values()
            .map(|record| PeerSnapshot {
                peer_id: record.peer_id.clone(),
                connected: record.connected,
                keys_exchanged: record.crypto.is_keyed(),
                verified: record.verified,
                fingerprint: record.crypto.public_key().map(crypto::fingerprint),
                rssi: record.rssi,
                last_seen: record.last_seen,
            })
            .collect();
        snapshots.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        snapshots
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
