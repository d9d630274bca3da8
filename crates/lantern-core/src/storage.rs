//! Persistence boundary
//!
//! The engine persists four kinds of state: the identity keypair, message
//! history, the duplicate-cache snapshot, and per-peer trust decisions.
//! [`Storage`] is the typed interface; [`KeyValueStorage`] adapts it onto
//! any string key-value store by encoding schema-tagged JSON records with
//! base64 byte fields, so platform backends (keychain, preferences files)
//! only have to move opaque strings.

use std::collections::HashMap;
use std::sync::Mutex;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use crate::errors::StorageError;
use crate::message::{Message, MessageStatus};
use crate::types::{MessageId, PeerId, Timestamp};

/// Schema tag written into every stored record
pub const STORAGE_SCHEMA: u8 = 1;

// ----------------------------------------------------------------------------
// Storage Trait
// ----------------------------------------------------------------------------

/// Typed persistence interface consumed by the engine.
///
/// Implementations are expected to be local and fast; the engine calls
/// these from its own task and the relay path never touches storage.
pub trait Storage: Send + Sync {
    fn store_identity(&self, public: &[u8; 32], private: &[u8; 32]) -> Result<(), StorageError>;
    fn load_identity(&self) -> Result<Option<([u8; 32], [u8; 32])>, StorageError>;

    /// Insert or replace a message in its conversation history
    fn store_message(&self, message: &Message) -> Result<(), StorageError>;
    /// Flip the status of a previously stored sent message
    fn update_message_status(
        &self,
        peer_id: &PeerId,
        id: MessageId,
        status: MessageStatus,
    ) -> Result<(), StorageError>;
    fn load_messages(&self, peer_id: &PeerId) -> Result<Vec<Message>, StorageError>;

    fn store_duplicate_cache(
        &self,
        entries: &[(MessageId, Timestamp)],
    ) -> Result<(), StorageError>;
    fn load_duplicate_cache(&self) -> Result<Vec<(MessageId, Timestamp)>, StorageError>;

    fn store_trust(&self, peer_id: &PeerId, verified: bool) -> Result<(), StorageError>;
    fn load_trust(&self, peer_id: &PeerId) -> Result<bool, StorageError>;
}

// ----------------------------------------------------------------------------
// Key-Value Store Trait
// ----------------------------------------------------------------------------

/// Minimal string key-value capability a platform backend must provide
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn put(&self, key: &str, value: String) -> Result<(), StorageError>;
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory key-value store for tests and ephemeral runs
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let data = self
            .data
            .lock()
            .map_err(|_| StorageError::Unavailable("kv mutex poisoned".into()))?;
        Ok(data.get(key).cloned())
    }

    fn put(&self, key: &str, value: String) -> Result<(), StorageError> {
        let mut data = self
            .data
            .lock()
            .map_err(|_| StorageError::Unavailable("kv mutex poisoned".into()))?;
        data.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut data = self
            .data
            .lock()
            .map_err(|_| StorageError::Unavailable("kv mutex poisoned".into()))?;
        data.remove(key);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Stored Records
// ----------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct IdentityRecord {
    schema: u8,
    public_key: String,
    private_key: String,
}

#[derive(Serialize, Deserialize)]
struct ConversationRecord {
    schema: u8,
    messages: Vec<Message>,
}

#[derive(Serialize, Deserialize)]
struct DuplicateCacheRecord {
    schema: u8,
    entries: Vec<(MessageId, u64)>,
}

#[derive(Serialize, Deserialize)]
struct TrustRecord {
    schema: u8,
    verified: bool,
}

// ----------------------------------------------------------------------------
// Key-Value Adapter
// ----------------------------------------------------------------------------

const IDENTITY_KEY: &str = "lantern/identity";
const DEDUP_KEY: &str = "lantern/dedup";

/// [`Storage`] implementation over any [`KeyValueStore`]
pub struct KeyValueStorage<S: KeyValueStore> {
    kv: S,
}

impl<S: KeyValueStore> KeyValueStorage<S> {
    pub fn new(kv: S) -> Self {
        Self { kv }
    }

    fn messages_key(peer_id: &PeerId) -> String {
        format!("lantern/messages/{peer_id}")
    }

    fn trust_key(peer_id: &PeerId) -> String {
        format!("lantern/trust/{peer_id}")
    }

    fn load_record<R: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<R>, StorageError> {
        let Some(raw) = self.kv.get(key)? else {
            return Ok(None);
        };
        let record = serde_json::from_str(&raw).map_err(|e| StorageError::CorruptRecord {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(record))
    }

    fn store_record<R: Serialize>(&self, key: &str, record: &R) -> Result<(), StorageError> {
        let raw = serde_json::to_string(record).map_err(|e| StorageError::CorruptRecord {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.kv.put(key, raw)
    }

    fn check_schema(key: &str, schema: u8) -> Result<(), StorageError> {
        if schema != STORAGE_SCHEMA {
            return Err(StorageError::UnsupportedSchema {
                key: key.to_string(),
                schema,
            });
        }
        Ok(())
    }
}

fn decode_key_material(key: &str, encoded: &str) -> Result<[u8; 32], StorageError> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| StorageError::CorruptRecord {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| StorageError::CorruptRecord {
            key: key.to_string(),
            reason: format!("key material is {} bytes, expected 32", bytes.len()),
        })
}

impl<S: KeyValueStore> Storage for KeyValueStorage<S> {
    fn store_identity(&self, public: &[u8; 32], private: &[u8; 32]) -> Result<(), StorageError> {
        let record = IdentityRecord {
            schema: STORAGE_SCHEMA,
            public_key: BASE64.encode(public),
            private_key: BASE64.encode(private),
        };
        self.store_record(IDENTITY_KEY, &record)
    }

    fn load_identity(&self) -> Result<Option<([u8; 32], [u8; 32])>, StorageError> {
        let Some(record) = self.load_record::<IdentityRecord>(IDENTITY_KEY)? else {
            return Ok(None);
        };
        Self::check_schema(IDENTITY_KEY, record.schema)?;
        let public = decode_key_material(IDENTITY_KEY, &record.public_key)?;
        let private = decode_key_material(IDENTITY_KEY, &record.private_key)?;
        Ok(Some((public, private)))
    }

    fn store_message(&self, message: &Message) -> Result<(), StorageError> {
        let key = Self::messages_key(&message.peer_id);
        let mut record = self
            .load_record::<ConversationRecord>(&key)?
            .unwrap_or(ConversationRecord {
                schema: STORAGE_SCHEMA,
                messages: Vec::new(),
            });
        Self::check_schema(&key, record.schema)?;

        match record.messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message.clone(),
            None => record.messages.push(message.clone()),
        }
        self.store_record(&key, &record)
    }

    fn update_message_status(
        &self,
        peer_id: &PeerId,
        id: MessageId,
        status: MessageStatus,
    ) -> Result<(), StorageError> {
        let key = Self::messages_key(peer_id);
        let Some(mut record) = self.load_record::<ConversationRecord>(&key)? else {
            return Ok(());
        };
        Self::check_schema(&key, record.schema)?;

        if let Some(message) = record.messages.iter_mut().find(|m| m.id == id) {
            message.status = Some(status);
            self.store_record(&key, &record)?;
        }
        Ok(())
    }

    fn load_messages(&self, peer_id: &PeerId) -> Result<Vec<Message>, StorageError> {
        let key = Self::messages_key(peer_id);
        let Some(record) = self.load_record::<ConversationRecord>(&key)? else {
            return Ok(Vec::new());
        };
        Self::check_schema(&key, record.schema)?;
        Ok(record.messages)
    }

    fn store_duplicate_cache(
        &self,
        entries: &[(MessageId, Timestamp)],
    ) -> Result<(), StorageError> {
        let record = DuplicateCacheRecord {
            schema: STORAGE_SCHEMA,
            entries: entries
                .iter()
                .map(|(id, ts)| (*id, ts.as_millis()))
                .collect(),
        };
        self.store_record(DEDUP_KEY, &record)
    }

    fn load_duplicate_cache(&self) -> Result<Vec<(MessageId, Timestamp)>, StorageError> {
        let Some(record) = self.load_record::<DuplicateCacheRecord>(DEDUP_KEY)? else {
            return Ok(Vec::new());
        };
        Self::check_schema(DEDUP_KEY, record.schema)?;
        Ok(record
            .entries
            .into_iter()
            .map(|(id, millis)| (id, Timestamp::new(millis)))
            .collect())
    }

    fn store_trust(&self, peer_id: &PeerId, verified: bool) -> Result<(), StorageError> {
        let record = TrustRecord {
            schema: STORAGE_SCHEMA,
            verified,
        };
        self.store_record(&Self::trust_key(peer_id), &record)
    }

    fn load_trust(&self, peer_id: &PeerId) -> Result<bool, StorageError> {
        let key = Self::trust_key(peer_id);
        let Some(record) = self.load_record::<TrustRecord>(&key)? else {
            return Ok(false);
        };
        Self::check_schema(&key, record.schema)?;
        Ok(record.verified)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
