//! Key pairs, shared-key agreement and settled topic derivation.

use {
    super::payload::{PubKey, SymKey},
    hkdf::Hkdf,
    pairing_rpc::domain::Topic,
    rand::{rngs::OsRng, CryptoRng, RngCore},
    sha2::{Digest, Sha256},
    std::fmt::{Debug, Formatter},
    x25519_dalek::{PublicKey, StaticSecret},
};

/// Key generation and agreement errors.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("Failed to expand shared pairing key: {0}")]
    SharedKeyExpansion(String),
    #[error("Invalid public key encoding: {0}")]
    PublicKeyEncoding(#[from] hex::FromHexError),
    #[error("Invalid public key length={0}")]
    PublicKeyLength(usize),
}

/// Per-side static key pair. The secret never leaves the process; each side
/// generates a fresh pair per proposal.
#[derive(Clone)]
pub struct Keypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl Debug for Keypair {
    /// Custom debug to hide the secret.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("secret", &"********")
            .field("public", &self.public)
            .finish()
    }
}

impl Keypair {
    pub fn generate() -> Self {
        Self::from_rng(OsRng)
    }

    pub fn from_rng<T>(csprng: T) -> Self
    where
        T: RngCore + CryptoRng,
    {
        let secret = StaticSecret::random_from_rng(csprng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_key(&self) -> &PubKey {
        self.public.as_bytes()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public.as_bytes())
    }

    /// Performs x25519 key agreement against the peer's public key and
    /// expands the result with HKDF-SHA256 into the symmetric pairing key.
    pub fn derive_shared_key(&self, peer_public: &PubKey) -> Result<SharedKey, KeyError> {
        let ikm = self.secret.diffie_hellman(&PublicKey::from(*peer_public));

        let mut sym_key = [0u8; 32];
        let hk = Hkdf::<Sha256>::new(None, ikm.as_bytes());
        hk.expand(&[], &mut sym_key)
            .map_err(|e| KeyError::SharedKeyExpansion(e.to_string()))?;

        Ok(SharedKey(sym_key))
    }
}

/// Symmetric key shared by the two sides of a settled pairing.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedKey(SymKey);

impl Debug for SharedKey {
    /// Custom debug to hide the symmetrical key.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedKey").field(&"********").finish()
    }
}

impl SharedKey {
    pub const fn from_bytes(bytes: SymKey) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &SymKey {
        &self.0
    }

    /// The settled topic is the hash of the shared key.
    pub fn derive_topic(&self) -> Topic {
        let mut hasher = Sha256::new();
        hasher.update(self.0);
        hex::encode(hasher.finalize()).into()
    }
}

/// Decodes a hex-encoded x25519 public key off the wire.
pub fn decode_public_key(hex_key: &str) -> Result<PubKey, KeyError> {
    let bytes = hex::decode(hex_key)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| KeyError::PublicKeyLength(len))
}

#[cfg(test)]
mod tests {
    use {super::*, hex_literal::hex};

    #[test]
    fn both_sides_derive_the_same_key_and_topic() {
        let proposer = Keypair::generate();
        let responder = Keypair::generate();

        let key_a = proposer.derive_shared_key(responder.public_key()).unwrap();
        let key_b = responder.derive_shared_key(proposer.public_key()).unwrap();

        assert_eq!(key_a, key_b);
        assert_eq!(key_a.derive_topic(), key_b.derive_topic());
    }

    #[test]
    fn topic_is_hash_of_shared_key() {
        let key = SharedKey::from_bytes(hex!(
            "7ff3e362f825ab868e20e767fe580d0311181632707e7c878cbeca0238d45b8b"
        ));

        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let expected: Topic = hex::encode(hasher.finalize()).into();

        assert_eq!(key.derive_topic(), expected);
        assert_eq!(key.derive_topic().as_str().len(), 64);
    }

    #[test]
    fn public_key_decoding() {
        let keypair = Keypair::generate();
        let decoded = decode_public_key(&keypair.public_key_hex()).unwrap();
        assert_eq!(&decoded, keypair.public_key());

        assert!(matches!(
            decode_public_key("abcd"),
            Err(KeyError::PublicKeyLength(2))
        ));
        assert!(matches!(
            decode_public_key("not hex"),
            Err(KeyError::PublicKeyEncoding(_))
        ));
    }
}
