//! Binary codec for the Lantern envelope
//!
//! Hand-rolled big-endian encoding with no padding. The decoder walks an
//! offset through the input, bounds-checking every field, and rejects any
//! trailing bytes: consumed length must equal input length exactly.

use crate::envelope::{
    MessageEnvelope, FIXED_HEADER_LEN, MAX_NONCE_LEN, MAX_PAYLOAD_LEN, MAX_TAG_LEN,
    MIN_ENVELOPE_LEN, PROTOCOL_VERSION,
};
use crate::errors::CodecError;
use crate::types::{MessageId, SenderId, Timestamp, Ttl};

// ----------------------------------------------------------------------------
// Encoding
// ----------------------------------------------------------------------------

/// Encode an envelope to its wire form.
///
/// Fails only when the envelope violates structural invariants; the output
/// length is deterministic in the envelope's fields.
pub fn encode(envelope: &MessageEnvelope) -> Result<Vec<u8>, CodecError> {
    envelope.validate()?;

    let mut bytes = Vec::with_capacity(envelope.encoded_len());
    bytes.push(envelope.version);
    bytes.extend_from_slice(envelope.message_id.as_bytes());
    bytes.extend_from_slice(envelope.sender_id.as_bytes());
    bytes.extend_from_slice(envelope.recipient_id.as_bytes());
    bytes.extend_from_slice(&envelope.timestamp.as_millis().to_be_bytes());
    bytes.push(envelope.ttl.value());
    bytes.extend_from_slice(&(envelope.nonce.len() as u16).to_be_bytes());
    bytes.extend_from_slice(&envelope.nonce);
    bytes.extend_from_slice(&(envelope.tag.len() as u16).to_be_bytes());
    bytes.extend_from_slice(&envelope.tag);
    bytes.extend_from_slice(&(envelope.ciphertext.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&envelope.ciphertext);

    debug_assert_eq!(bytes.len(), envelope.encoded_len());
    Ok(bytes)
}

// ----------------------------------------------------------------------------
// Decoding
// ----------------------------------------------------------------------------

/// Decode an envelope from its wire form.
///
/// `decode(encode(e)) == e` for every valid envelope, and
/// `encode(decode(bytes)) == bytes` for every valid encoding.
pub fn decode(bytes: &[u8]) -> Result<MessageEnvelope, CodecError> {
    if bytes.len() < MIN_ENVELOPE_LEN {
        return Err(CodecError::ShortHeader);
    }

    let version = bytes[0];
    if version != PROTOCOL_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    let mut offset = 1;

    let mut message_id = [0u8; MessageId::LEN];
    message_id.copy_from_slice(&bytes[offset..offset + MessageId::LEN]);
    offset += MessageId::LEN;

    let mut sender_id = [0u8; SenderId::LEN];
    sender_id.copy_from_slice(&bytes[offset..offset + SenderId::LEN]);
    offset += SenderId::LEN;

    let mut recipient_id = [0u8; SenderId::LEN];
    recipient_id.copy_from_slice(&bytes[offset..offset + SenderId::LEN]);
    offset += SenderId::LEN;

    let mut timestamp = [0u8; 8];
    timestamp.copy_from_slice(&bytes[offset..offset + 8]);
    let timestamp = u64::from_be_bytes(timestamp);
    offset += 8;

    let ttl = bytes[offset];
    offset += 1;
    debug_assert_eq!(offset, FIXED_HEADER_LEN);

    let nonce = read_field(bytes, &mut offset, "nonce", WidePrefix::U16, MAX_NONCE_LEN)?;
    let tag = read_field(bytes, &mut offset, "tag", WidePrefix::U16, MAX_TAG_LEN)?;
    let ciphertext = read_field(bytes, &mut offset, "payload", WidePrefix::U32, MAX_PAYLOAD_LEN)?;

    if offset != bytes.len() {
        return Err(CodecError::LengthMismatch {
            consumed: offset,
            input: bytes.len(),
        });
    }

    Ok(MessageEnvelope {
        version,
        message_id: MessageId::from_bytes(message_id),
        sender_id: SenderId::new(sender_id),
        recipient_id: SenderId::new(recipient_id),
        timestamp: Timestamp::new(timestamp),
        ttl: Ttl::new(ttl),
        nonce,
        tag,
        ciphertext,
    })
}

enum WidePrefix {
    U16,
    U32,
}

fn read_field(
    bytes: &[u8],
    offset: &mut usize,
    field: &'static str,
    prefix: WidePrefix,
    max: usize,
) -> Result<Vec<u8>, CodecError> {
    let prefix_len = match prefix {
        WidePrefix::U16 => 2,
        WidePrefix::U32 => 4,
    };
    if bytes.len() < *offset + prefix_len {
        return Err(CodecError::ShortHeader);
    }

    let declared = match prefix {
        WidePrefix::U16 => {
            u16::from_be_bytes([bytes[*offset], bytes[*offset + 1]]) as usize
        }
        WidePrefix::U32 => u32::from_be_bytes([
            bytes[*offset],
            bytes[*offset + 1],
            bytes[*offset + 2],
            bytes[*offset + 3],
        ]) as usize,
    };
    *offset += prefix_len;

    if declared > max {
        return Err(CodecError::FieldTooLarge {
            field,
            len: declared,
            max,
        });
    }

    let remaining = bytes.len() - *offset;
    if declared > remaining {
        return Err(CodecError::LengthOverrun {
            field,
            declared,
            remaining,
        });
    }

    let data = bytes[*offset..*offset + declared].to_vec();
    *offset += declared;
    Ok(data)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_envelope() -> MessageEnvelope {
        MessageEnvelope {
            version: PROTOCOL_VERSION,
            message_id: MessageId::from_bytes([
                0x55, 0x0e, 0x84, 0x00, 0xe2, 0x9b, 0x41, 0xd4, 0xa7, 0x16, 0x44, 0x66, 0x55,
                0x44, 0x00, 0x00,
            ]),
            sender_id: SenderId::new([1, 2, 3, 4, 5, 6, 7, 8]),
            recipient_id: SenderId::new([8, 7, 6, 5, 4, 3, 2, 1]),
            timestamp: Timestamp::new(1_700_000_000_000),
            ttl: Ttl::new(10),
            nonce: vec![0xaa; 24],
            tag: vec![0xbb; 16],
            ciphertext: b"ciphertext bytes".to_vec(),
        }
    }

    #[test]
    fn test_roundtrip() {
        let envelope = sample_envelope();
        let bytes = encode(&envelope).unwrap();
        assert_eq!(bytes.len(), envelope.encoded_len());
        assert_eq!(decode(&bytes).unwrap(), envelope);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let envelope = sample_envelope();
        assert_eq!(encode(&envelope).unwrap(), encode(&envelope.clone()).unwrap());
    }

    #[test]
    fn test_timestamp_is_big_endian() {
        let envelope = sample_envelope();
        let bytes = encode(&envelope).unwrap();

        // timestamp sits right after version + three ids
        let at = 1 + 16 + 8 + 8;
        let field: [u8; 8] = bytes[at..at + 8].try_into().unwrap();
        assert_eq!(u64::from_be_bytes(field), 1_700_000_000_000);
        assert_ne!(u64::from_le_bytes(field), 1_700_000_000_000);
    }

    #[test]
    fn test_empty_and_short_inputs() {
        assert_eq!(decode(&[]), Err(CodecError::ShortHeader));
        assert_eq!(decode(&[1u8; 10]), Err(CodecError::ShortHeader));

        let bytes = encode(&sample_envelope()).unwrap();
        assert!(decode(&bytes[..MIN_ENVELOPE_LEN - 1]).is_err());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut bytes = encode(&sample_envelope()).unwrap();
        bytes[0] = 3;
        assert_eq!(decode(&bytes), Err(CodecError::UnsupportedVersion(3)));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = encode(&sample_envelope()).unwrap();
        bytes.push(0);
        assert!(matches!(
            decode(&bytes),
            Err(CodecError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_payload_is_overrun() {
        let bytes = encode(&sample_envelope()).unwrap();
        let truncated = &bytes[..bytes.len() - 4];
        assert!(matches!(
            decode(truncated),
            Err(CodecError::LengthOverrun { field: "payload", .. })
        ));
    }

    #[test]
    fn test_oversized_nonce_declaration_rejected() {
        let mut bytes = encode(&sample_envelope()).unwrap();
        // overwrite nonce_len with 2000 > MAX_NONCE_LEN
        let at = FIXED_HEADER_LEN;
        bytes[at..at + 2].copy_from_slice(&2_000u16.to_be_bytes());
        assert!(matches!(
            decode(&bytes),
            Err(CodecError::FieldTooLarge { field: "nonce", .. })
        ));
    }

    #[test]
    fn test_empty_variable_fields_roundtrip() {
        let envelope = MessageEnvelope {
            nonce: Vec::new(),
            tag: Vec::new(),
            ciphertext: Vec::new(),
            ..sample_envelope()
        };
        let bytes = encode(&envelope).unwrap();
        assert_eq!(bytes.len(), MIN_ENVELOPE_LEN);
        assert_eq!(decode(&bytes).unwrap(), envelope);
    }

    #[test]
    fn test_encode_rejects_invalid_envelope() {
        let mut envelope = sample_envelope();
        envelope.ciphertext = vec![0u8; MAX_PAYLOAD_LEN + 1];
        assert!(matches!(
            encode(&envelope),
            Err(CodecError::FieldTooLarge { field: "payload", .. })
        ));
    }
}
