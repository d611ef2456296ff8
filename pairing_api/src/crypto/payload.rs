//! Envelope encoding, encryption and decryption for relay payloads.
//!
//! Two envelope types are used. Type 0 carries only the sealed payload and
//! is opened with a known symmetric key. Type 1 additionally prefixes the
//! sender's public key, letting the receiver recover the symmetric key via
//! key agreement before any shared state exists; all proposal-topic traffic
//! uses it.

use {
    super::keys::{KeyError, Keypair},
    base64::{prelude::BASE64_STANDARD, DecodeError, Engine},
    chacha20poly1305::{
        aead::{Aead, KeyInit, OsRng, Payload},
        AeadCore, ChaCha20Poly1305, Nonce,
    },
    std::string::FromUtf8Error,
};

const TYPE_0: u8 = 0;
const TYPE_1: u8 = 1;
const TYPE_LENGTH: usize = 1;
const INIT_VEC_LEN: usize = 12;
const PUB_KEY_LENGTH: usize = 32;
const SYM_KEY_LENGTH: usize = 32;

pub type InitVec = [u8; INIT_VEC_LEN];
pub type SymKey = [u8; SYM_KEY_LENGTH];
pub type PubKey = [u8; PUB_KEY_LENGTH];

/// Payload encoding, decoding, encryption and decryption errors.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("Payload is not base64 encoded")]
    Base64Decode(#[from] DecodeError),
    #[error("Payload decryption failure: {0}")]
    Decryption(String),
    #[error("Payload encryption failure: {0}")]
    Encryption(String),
    #[error("Invalid Initialization Vector length={0}")]
    InitVecLen(usize),
    #[error("Payload is truncated")]
    Truncated,
    #[error("Payload is not a valid JSON encoding")]
    PayloadJson(#[from] FromUtf8Error),
    #[error("Unsupported envelope type={0}")]
    UnsupportedEnvelopeType(u8),
    #[error("Unexpected envelope type={0}, expected={1}")]
    UnexpectedEnvelopeType(u8, u8),
    #[error(transparent)]
    Key(#[from] KeyError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnvelopeType<'a> {
    Type0,
    Type1 { sender_public_key: &'a PubKey },
}

/// Non-owning view of the decoded payload blob.
#[derive(Clone, Debug, PartialEq, Eq)]
struct EncodingParams<'a> {
    /// Encrypted payload.
    sealed: &'a [u8],
    /// Initialization Vector.
    init_vec: &'a InitVec,
    /// Sender public key, present in type 1 envelopes only.
    sender_public_key: Option<&'a PubKey>,
}

impl<'a> EncodingParams<'a> {
    fn parse_decoded(data: &'a [u8]) -> Result<Self, PayloadError> {
        let envelope_type = *data.first().ok_or(PayloadError::Truncated)?;
        match envelope_type {
            TYPE_0 => {
                let init_vec_end_index = TYPE_LENGTH + INIT_VEC_LEN;
                let init_vec = data
                    .get(TYPE_LENGTH..init_vec_end_index)
                    .and_then(|s| s.try_into().ok())
                    .ok_or(PayloadError::Truncated)?;
                Ok(EncodingParams {
                    init_vec,
                    sealed: data.get(init_vec_end_index..).ok_or(PayloadError::Truncated)?,
                    sender_public_key: None,
                })
            }
            TYPE_1 => {
                let key_end_index = TYPE_LENGTH + PUB_KEY_LENGTH;
                let init_vec_end_index = key_end_index + INIT_VEC_LEN;
                let sender_public_key = data
                    .get(TYPE_LENGTH..key_end_index)
                    .and_then(|s| s.try_into().ok())
                    .ok_or(PayloadError::Truncated)?;
                let init_vec = data
                    .get(key_end_index..init_vec_end_index)
                    .and_then(|s| s.try_into().ok())
                    .ok_or(PayloadError::Truncated)?;
                Ok(EncodingParams {
                    init_vec,
                    sealed: data.get(init_vec_end_index..).ok_or(PayloadError::Truncated)?,
                    sender_public_key: Some(sender_public_key),
                })
            }
            _ => Err(PayloadError::UnsupportedEnvelopeType(envelope_type)),
        }
    }
}

/// Encrypts and encodes the plain-text payload.
pub fn encrypt_and_encode<T>(
    envelope_type: EnvelopeType,
    msg: T,
    key: &SymKey,
) -> Result<String, PayloadError>
where
    T: AsRef<[u8]>,
{
    let payload = Payload {
        msg: msg.as_ref(),
        aad: &[],
    };
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);

    let sealed = encrypt(&nonce, payload, key)?;
    Ok(encode(
        envelope_type,
        sealed.as_slice(),
        nonce
            .as_slice()
            .try_into()
            .map_err(|_| PayloadError::InitVecLen(nonce.len()))?,
    ))
}

/// Decodes and decrypts an envelope with a known symmetric key.
///
/// Both envelope types are accepted; the embedded sender key of a type 1
/// envelope is ignored once the symmetric key is known.
pub fn decode_and_decrypt<T>(msg: T, key: &SymKey) -> Result<String, PayloadError>
where
    T: AsRef<[u8]>,
{
    let data = BASE64_STANDARD.decode(msg)?;
    let decoded = EncodingParams::parse_decoded(&data)?;

    let payload = Payload {
        msg: decoded.sealed,
        aad: &[],
    };
    let decrypted = decrypt(decoded.init_vec.into(), payload, key)?;

    Ok(String::from_utf8(decrypted)?)
}

/// Decodes and decrypts a type 1 envelope without prior shared state.
///
/// The symmetric key is recovered by running key agreement between the
/// receiver's static secret and the sender key embedded in the envelope.
pub fn decode_and_decrypt_type1<T>(msg: T, keypair: &Keypair) -> Result<String, PayloadError>
where
    T: AsRef<[u8]>,
{
    let data = BASE64_STANDARD.decode(msg)?;
    let decoded = EncodingParams::parse_decoded(&data)?;
    let sender_public_key = decoded
        .sender_public_key
        .ok_or(PayloadError::UnexpectedEnvelopeType(TYPE_0, TYPE_1))?;

    let shared_key = keypair.derive_shared_key(sender_public_key)?;
    let payload = Payload {
        msg: decoded.sealed,
        aad: &[],
    };
    let decrypted = decrypt(decoded.init_vec.into(), payload, shared_key.as_bytes())?;

    Ok(String::from_utf8(decrypted)?)
}

fn encrypt(nonce: &Nonce, payload: Payload<'_, '_>, key: &SymKey) -> Result<Vec<u8>, PayloadError> {
    let cipher = ChaCha20Poly1305::new(key.into());
    let sealed = cipher
        .encrypt(nonce, payload)
        .map_err(|e| PayloadError::Encryption(e.to_string()))?;

    Ok(sealed)
}

fn encode(envelope_type: EnvelopeType, sealed: &[u8], init_vec: &InitVec) -> String {
    match envelope_type {
        EnvelopeType::Type0 => {
            BASE64_STANDARD.encode([&[TYPE_0], init_vec.as_slice(), sealed].concat())
        }
        EnvelopeType::Type1 { sender_public_key } => BASE64_STANDARD
            .encode([&[TYPE_1], sender_public_key.as_slice(), init_vec, sealed].concat()),
    }
}

fn decrypt(nonce: &Nonce, payload: Payload<'_, '_>, key: &SymKey) -> Result<Vec<u8>, PayloadError> {
    let cipher = ChaCha20Poly1305::new(key.into());
    let unsealed = cipher
        .decrypt(nonce, payload)
        .map_err(|e| PayloadError::Decryption(e.to_string()))?;

    Ok(unsealed)
}

#[cfg(test)]
mod tests {
    use {super::*, crate::crypto::keys::Keypair, anyhow::Result};

    const PLAINTEXT: &str = r#"{"id":1,"jsonrpc":"2.0","method":"pairing_delete","params":{"reason":"gone"}}"#;

    #[test]
    fn type0_roundtrip() -> Result<()> {
        let key: SymKey = [11u8; SYM_KEY_LENGTH];

        let encoded = encrypt_and_encode(EnvelopeType::Type0, PLAINTEXT, &key)?;
        let decoded = decode_and_decrypt(&encoded, &key)?;

        assert_eq!(decoded, PLAINTEXT);

        Ok(())
    }

    #[test]
    fn type1_roundtrip_via_key_agreement() -> Result<()> {
        let sender = Keypair::generate();
        let receiver = Keypair::generate();
        let shared = sender.derive_shared_key(receiver.public_key())?;

        let encoded = encrypt_and_encode(
            EnvelopeType::Type1 {
                sender_public_key: sender.public_key(),
            },
            PLAINTEXT,
            shared.as_bytes(),
        )?;

        // The receiver has no shared key yet and recovers it from the
        // envelope.
        let decoded = decode_and_decrypt_type1(&encoded, &receiver)?;
        assert_eq!(decoded, PLAINTEXT);

        // A known shared key opens the same envelope directly.
        let decoded = decode_and_decrypt(&encoded, shared.as_bytes())?;
        assert_eq!(decoded, PLAINTEXT);

        Ok(())
    }

    #[test]
    fn type0_envelope_rejected_when_type1_expected() -> Result<()> {
        let receiver = Keypair::generate();
        let key: SymKey = [11u8; SYM_KEY_LENGTH];
        let encoded = encrypt_and_encode(EnvelopeType::Type0, PLAINTEXT, &key)?;

        assert!(matches!(
            decode_and_decrypt_type1(&encoded, &receiver),
            Err(PayloadError::UnexpectedEnvelopeType(..))
        ));

        Ok(())
    }

    #[test]
    fn tampered_payload_fails_decryption() -> Result<()> {
        let key: SymKey = [11u8; SYM_KEY_LENGTH];
        let encoded = encrypt_and_encode(EnvelopeType::Type0, PLAINTEXT, &key)?;

        let mut data = BASE64_STANDARD.decode(&encoded)?;
        if let Some(last) = data.last_mut() {
            *last ^= 0xff;
        }
        let tampered = BASE64_STANDARD.encode(&data);

        assert!(matches!(
            decode_and_decrypt(&tampered, &key),
            Err(PayloadError::Decryption(_))
        ));

        Ok(())
    }

    #[test]
    fn truncated_and_unknown_envelopes_are_rejected() {
        let key: SymKey = [11u8; SYM_KEY_LENGTH];

        let empty = BASE64_STANDARD.encode([0u8; 0]);
        assert!(matches!(
            decode_and_decrypt(empty, &key),
            Err(PayloadError::Truncated)
        ));

        let short_type1 = BASE64_STANDARD.encode([TYPE_1, 1, 2, 3]);
        assert!(matches!(
            decode_and_decrypt(short_type1, &key),
            Err(PayloadError::Truncated)
        ));

        let unknown = BASE64_STANDARD.encode([9u8; 64]);
        assert!(matches!(
            decode_and_decrypt(unknown, &key),
            Err(PayloadError::UnsupportedEnvelopeType(9))
        ));
    }
}
