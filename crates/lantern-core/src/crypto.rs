//! Cryptographic primitives for Lantern
//!
//! Hides the underlying libraries behind the handful of operations the
//! engine needs: the long-lived X25519 identity keypair, Diffie-Hellman key
//! agreement, XChaCha20-Poly1305 authenticated encryption, and the SHA-512
//! derivations for fingerprints and wire-level sender ids.
//!
//! Nonces are drawn from the OS RNG inside each [`encrypt`] call, so nonce
//! reuse is structurally impossible.

use chacha20poly1305::{
    aead::{AeadInPlace, KeyInit},
    Key, Tag, XChaCha20Poly1305, XNonce,
};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::errors::{CryptoError, StorageError};
use crate::storage::Storage;
use crate::types::SenderId;

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Symmetric key size
pub const KEY_LEN: usize = 32;

/// XChaCha20-Poly1305 nonce size
pub const NONCE_LEN: usize = 24;

/// Poly1305 authentication tag size
pub const TAG_LEN: usize = 16;

/// Hex characters in a rendered fingerprint
pub const FINGERPRINT_HEX_LEN: usize = 32;

// ----------------------------------------------------------------------------
// Identity
// ----------------------------------------------------------------------------

/// The node's long-lived X25519 identity keypair.
///
/// Generated once on first run, persisted through the storage interface,
/// and never rotated without user action.
pub struct Identity {
    secret: StaticSecret,
    public: PublicKey,
}

impl Identity {
    /// Generate a fresh random identity
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Rebuild an identity from its persisted private key
    pub fn from_private_bytes(private: [u8; 32]) -> Self {
        let secret = StaticSecret::from(private);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Load the persisted identity, or generate and persist a new one.
    /// Idempotent after the first success.
    pub fn load_or_generate(storage: &dyn Storage) -> Result<Self, StorageError> {
        if let Some((_, private)) = storage.load_identity()? {
            return Ok(Self::from_private_bytes(private));
        }
        let identity = Self::generate();
        storage.store_identity(&identity.public_key_bytes(), &identity.private_key_bytes())?;
        Ok(identity)
    }

    /// The 32-byte public key
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// The 32-byte private key, for persistence only
    pub fn private_key_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// X25519 key agreement with a peer's public key.
    /// Commutative: both sides derive the same 32-byte shared secret.
    pub fn agree(&self, peer_public: &[u8; 32]) -> [u8; 32] {
        let peer = PublicKey::from(*peer_public);
        self.secret.diffie_hellman(&peer).to_bytes()
    }

    /// This node's wire-level sender id
    pub fn sender_id(&self) -> SenderId {
        derive_sender_id(&self.public_key_bytes())
    }

    /// This node's fingerprint, as rendered in the QR code
    pub fn fingerprint_hex(&self) -> String {
        fingerprint(&self.public_key_bytes())
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("public", &hex::encode(self.public.as_bytes()))
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Authenticated Encryption
// ----------------------------------------------------------------------------

/// Output of one [`encrypt`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedPayload {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub tag: [u8; TAG_LEN],
}

/// Encrypt a plaintext under a shared secret with a fresh random nonce
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<SealedPayload, CryptoError> {
    let cipher = cipher_for(key)?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(XNonce::from_slice(&nonce), b"", &mut buffer)
        .map_err(|_| CryptoError::AuthFail)?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(&tag);

    Ok(SealedPayload {
        ciphertext: buffer,
        nonce,
        tag: tag_bytes,
    })
}

/// Decrypt and authenticate a ciphertext.
///
/// The caller learns only that decryption failed, not why; the error kind
/// is for logging.
pub fn decrypt(
    ciphertext: &[u8],
    nonce: &[u8],
    tag: &[u8],
    key: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = cipher_for(key)?;
    if nonce.len() != NONCE_LEN {
        return Err(CryptoError::BadNonceLength(nonce.len()));
    }
    if tag.len() != TAG_LEN {
        return Err(CryptoError::BadTagLength(tag.len()));
    }

    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            XNonce::from_slice(nonce),
            b"",
            &mut buffer,
            Tag::from_slice(tag),
        )
        .map_err(|_| CryptoError::AuthFail)?;

    Ok(buffer)
}

fn cipher_for(key: &[u8]) -> Result<XChaCha20Poly1305, CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::BadKeyLength(key.len()));
    }
    Ok(XChaCha20Poly1305::new(Key::from_slice(key)))
}

// ----------------------------------------------------------------------------
// Fingerprints and Sender Ids
// ----------------------------------------------------------------------------

/// First 32 hex characters of the SHA-512 of a public key
pub fn fingerprint(public_key: &[u8; 32]) -> String {
    let digest = Sha512::digest(public_key);
    let mut rendered = hex::encode(digest);
    rendered.truncate(FINGERPRINT_HEX_LEN);
    rendered
}

/// First 8 bytes of the SHA-512 of a public key
pub fn derive_sender_id(public_key: &[u8; 32]) -> SenderId {
    let digest = Sha512::digest(public_key);
    let mut id = [0u8; SenderId::LEN];
    id.copy_from_slice(&digest[..SenderId::LEN]);
    SenderId::new(id)
}

/// Compare a scanned fingerprint against the one derived from a public key.
///
/// Whitespace-trimmed, case-insensitive, constant-time over the rendered
/// hex once lengths match.
pub fn verify_fingerprint(scanned: &str, public_key: &[u8; 32]) -> bool {
    let scanned = scanned.trim().to_ascii_lowercase();
    let expected = fingerprint(public_key);
    if scanned.len() != expected.len() {
        return false;
    }
    scanned.as_bytes().ct_eq(expected.as_bytes()).into()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
