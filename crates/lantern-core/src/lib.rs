//! Lantern protocol library
//!
//! Lantern is an offline peer-to-peer messaging fabric over Bluetooth Low
//! Energy, built for emergency use when no internet or cellular service
//! exists. Nearby devices discover each other, establish authenticated
//! encrypted channels, and exchange short text messages; envelopes flood
//! through intermediate peers so endpoints out of direct radio range can
//! still communicate.
//!
//! This crate is the protocol layer: the bit-exact wire codec, the
//! cryptographic channel, the duplicate-detection cache, the peer
//! directory, and the storage and transport interfaces. The orchestration
//! task that drives them -- send, receive, relay, retry -- lives in the
//! `lantern-engine` crate.
//!
//! ## Wire compatibility
//!
//! Two nodes interoperate iff they agree on protocol version 1, big-endian
//! integer encoding, the SHA-512 sender-id derivation, and the
//! XChaCha20-Poly1305 parameters (24-byte nonce, 16-byte tag, 32-byte key).

pub mod config;
pub mod crypto;
pub mod dedup;
pub mod envelope;
pub mod errors;
pub mod message;
pub mod peers;
pub mod storage;
pub mod transport;
pub mod types;
pub mod wire;

pub use config::EngineConfig;
pub use envelope::MessageEnvelope;
pub use errors::{
    CodecError, CryptoError, LanternError, Result, SendError, StorageError, TransportError,
};
pub use message::{Message, MessageDirection, MessageStatus};
pub use peers::{PeerCrypto, PeerSnapshot, PeerTable};
pub use storage::{KeyValueStorage, KeyValueStore, MemoryKeyValueStore, Storage};
pub use transport::{Transport, TransportEvent, TransportEventReceiver, TransportEventSender};
pub use types::{
    ManualTimeSource, MessageId, PeerId, SenderId, SystemTimeSource, TimeSource, Timestamp, Ttl,
};
