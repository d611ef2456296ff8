use {
    rand::{rngs::OsRng, RngCore},
    serde::{Deserialize, Serialize},
    std::{
        fmt::{self, Display, Formatter},
        str::FromStr,
        sync::Arc,
    },
};

pub const TOPIC_LENGTH: usize = 32;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DecodingError {
    #[error("Invalid encoding")]
    Encoding,

    #[error("Invalid data length")]
    Length,
}

/// Hex-encoded 32 byte identifier of a relay subscription.
///
/// Proposal topics are freshly random; settled topics are derived from the
/// shared pairing key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(Arc<str>);

impl Topic {
    pub fn generate() -> Self {
        DecodedTopic::generate().into()
    }

    /// Validates the encoding by round-tripping through [`DecodedTopic`].
    pub fn decode(&self) -> Result<DecodedTopic, DecodingError> {
        self.0.parse()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Topic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<DecodedTopic> for Topic {
    fn from(value: DecodedTopic) -> Self {
        Self(value.to_string().into())
    }
}

impl From<String> for Topic {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

impl From<&str> for Topic {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

/// Raw 32 byte topic value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecodedTopic([u8; TOPIC_LENGTH]);

impl DecodedTopic {
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOPIC_LENGTH];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; TOPIC_LENGTH]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; TOPIC_LENGTH] {
        &self.0
    }
}

impl Display for DecodedTopic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for DecodedTopic {
    type Err = DecodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let data = hex::decode(s).map_err(|_| DecodingError::Encoding)?;
        let bytes = data.try_into().map_err(|_| DecodingError::Length)?;
        Ok(Self(bytes))
    }
}

/// JSON-RPC message identifier.
///
/// Generated from the current timestamp in microseconds, which keeps ids
/// unique and monotonic within a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    pub fn generate() -> Self {
        Self(chrono::Utc::now().timestamp_micros() as u64)
    }

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_generate_roundtrip() {
        let topic = Topic::generate();
        let decoded = topic.decode().unwrap();
        assert_eq!(Topic::from(decoded), topic);
        assert_eq!(topic.as_str().len(), TOPIC_LENGTH * 2);
    }

    #[test]
    fn decoded_topic_parsing() {
        let topic_str = "c9e6d30fb34afe70a15c14e9337ba8e4d5a35dd695c39b94884b0ee60c69d168";
        let decoded = topic_str.parse::<DecodedTopic>().unwrap();
        assert_eq!(decoded.to_string(), topic_str);

        assert_eq!(
            "85089843ce".parse::<DecodedTopic>(),
            Err(DecodingError::Length)
        );
        assert_eq!(
            "zz".repeat(32).parse::<DecodedTopic>(),
            Err(DecodingError::Encoding)
        );
    }
}
