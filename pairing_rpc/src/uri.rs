//! Shareable pairing URI: the out-of-band signal binding a proposal topic
//! to the proposer's public key and relay.
//!
//! https://github.com/ethereum/EIPs/blob/master/EIPS/eip-1328.md

use {
    crate::{
        domain::Topic,
        rpc::{Relay, RELAY_PROTOCOL},
    },
    regex::Regex,
    std::{
        fmt::{Debug, Display, Formatter},
        str::FromStr,
    },
    url::Url,
};

/// URI scheme of the pairing signal.
pub const URI_SCHEME: &str = "wc";

/// Version of the pairing protocol encoded in the URI.
pub const URI_VERSION: &str = "2";

pub const KEY_LENGTH: usize = 32;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ParseError {
    #[error("Expecting protocol \"wc\" but \"{protocol}\" is found.")]
    UnexpectedProtocol { protocol: String },
    #[error(transparent)]
    Url(#[from] url::ParseError),
    #[error("Failed to parse topic and version")]
    InvalidTopicAndVersion,
    #[error("Topic not found")]
    TopicNotFound,
    #[error("Version not found")]
    VersionNotFound,
    #[error("Relay protocol not found")]
    RelayProtocolNotFound,
    #[error("Key not found")]
    KeyNotFound,
    #[error("Failed to parse key: {0:?}")]
    InvalidKey(#[from] hex::FromHexError),
    #[error("Invalid key length={0}")]
    InvalidKeyLength(usize),
    #[error("Unexpected parameter, key: {0:?}, value: {1:?}")]
    UnexpectedParameter(String, String),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Params {
    pub relay_protocol: String,
    pub public_key: [u8; KEY_LENGTH],
    pub relay_data: Option<String>,
}

/// The pairing signal: `wc:{topic}@{version}?relay-protocol=…&publicKey=…`.
#[derive(Clone, Eq, PartialEq)]
pub struct PairingUri {
    pub topic: Topic,
    pub version: String,
    pub params: Params,
}

impl PairingUri {
    /// Formats the signal for a fresh proposal.
    pub fn new(topic: Topic, relay: &Relay, public_key: [u8; KEY_LENGTH]) -> Self {
        Self {
            topic,
            version: URI_VERSION.to_owned(),
            params: Params {
                relay_protocol: relay.protocol.clone(),
                public_key,
                relay_data: relay.data.clone(),
            },
        }
    }

    pub fn relay(&self) -> Relay {
        Relay {
            protocol: if self.params.relay_protocol.is_empty() {
                RELAY_PROTOCOL.to_owned()
            } else {
                self.params.relay_protocol.clone()
            },
            data: self.params.relay_data.clone(),
        }
    }

    fn parse_topic_and_version(path: &str) -> Result<(Topic, String), ParseError> {
        let caps = Regex::new(r"^(?P<topic>[[:word:]-]+)@(?P<version>\d+)$")
            .expect("invalid regex")
            .captures(path)
            .ok_or(ParseError::InvalidTopicAndVersion)?;
        let topic = caps
            .name("topic")
            .ok_or(ParseError::TopicNotFound)?
            .as_str()
            .to_owned();
        let version = caps
            .name("version")
            .ok_or(ParseError::VersionNotFound)?
            .as_str()
            .to_owned();
        Ok((topic.into(), version))
    }

    fn parse_params(url: &Url) -> Result<Params, ParseError> {
        let queries = url.query_pairs();

        let mut relay_protocol: Option<String> = None;
        let mut public_key: Option<String> = None;
        let mut relay_data: Option<String> = None;
        for (k, v) in queries {
            match k.as_ref() {
                "relay-protocol" => relay_protocol = Some((*v).to_owned()),
                "publicKey" => public_key = Some((*v).to_owned()),
                "relay-data" => relay_data = Some((*v).to_owned()),
                _ => {
                    return Result::Err(ParseError::UnexpectedParameter(
                        (*k).to_owned(),
                        (*v).to_owned(),
                    ))
                }
            }
        }

        let key = hex::decode(public_key.ok_or(ParseError::KeyNotFound)?)?;
        let key_len = key.len();
        Ok(Params {
            relay_protocol: relay_protocol.ok_or(ParseError::RelayProtocolNotFound)?,
            public_key: key
                .try_into()
                .map_err(|_| ParseError::InvalidKeyLength(key_len))?,
            relay_data,
        })
    }
}

impl Debug for PairingUri {
    /// Debug with key masked.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingUri")
            .field("topic", &self.topic)
            .field("version", &self.version)
            .field("relay-protocol", &self.params.relay_protocol)
            .field("key", &"***")
            .field(
                "relay-data",
                &self.params.relay_data.as_deref().unwrap_or(""),
            )
            .finish()
    }
}

impl Display for PairingUri {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{URI_SCHEME}:{}@{}?relay-protocol={}",
            self.topic, self.version, self.params.relay_protocol,
        )?;
        if let Some(data) = &self.params.relay_data {
            write!(f, "&relay-data={data}")?;
        }
        write!(f, "&publicKey={}", hex::encode(self.params.public_key))
    }
}

impl FromStr for PairingUri {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::from_str(s)?;

        if url.scheme() != URI_SCHEME {
            return Result::Err(ParseError::UnexpectedProtocol {
                protocol: url.scheme().to_owned(),
            });
        }

        let (topic, version) = Self::parse_topic_and_version(url.path())?;
        Ok(Self {
            topic,
            version,
            params: Self::parse_params(&url)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_uri() {
        let uri = "wc:c9e6d30fb34afe70a15c14e9337ba8e4d5a35dd695c39b94884b0ee60c69d168@2?relay-protocol=irn&publicKey=7ff3e362f825ab868e20e767fe580d0311181632707e7c878cbeca0238d45b8b";

        let mut expected_key = [0u8; KEY_LENGTH];
        hex::decode_to_slice(
            "7ff3e362f825ab868e20e767fe580d0311181632707e7c878cbeca0238d45b8b",
            &mut expected_key,
        )
        .unwrap();

        let actual = PairingUri {
            topic: "c9e6d30fb34afe70a15c14e9337ba8e4d5a35dd695c39b94884b0ee60c69d168".into(),
            version: "2".to_owned(),
            params: Params {
                relay_protocol: "irn".to_owned(),
                public_key: expected_key,
                relay_data: None,
            },
        };
        let expected = PairingUri::from_str(uri).unwrap();

        assert_eq!(actual, expected);
    }

    #[test]
    fn format_parse_roundtrip() {
        let topic = Topic::generate();
        let uri = PairingUri::new(topic.clone(), &Relay::default(), [7u8; KEY_LENGTH]);

        let parsed = PairingUri::from_str(&uri.to_string()).unwrap();

        assert_eq!(parsed, uri);
        assert_eq!(parsed.topic, topic);
        assert_eq!(parsed.relay(), Relay::default());
    }

    #[test]
    fn reject_unexpected_scheme() {
        let uri = "http:c9e6d30fb34afe70a15c14e9337ba8e4d5a35dd695c39b94884b0ee60c69d168@2?relay-protocol=irn&publicKey=7ff3e362f825ab868e20e767fe580d0311181632707e7c878cbeca0238d45b8b";

        assert!(matches!(
            PairingUri::from_str(uri),
            Err(ParseError::UnexpectedProtocol { .. })
        ));
    }

    #[test]
    fn reject_short_key() {
        let uri = "wc:c9e6d30fb34afe70a15c14e9337ba8e4d5a35dd695c39b94884b0ee60c69d168@2?relay-protocol=irn&publicKey=7ff3e362";

        assert_eq!(
            PairingUri::from_str(uri),
            Err(ParseError::InvalidKeyLength(4))
        );
    }

    #[test]
    fn reject_unexpected_parameter() {
        let uri = "wc:c9e6d30fb34afe70a15c14e9337ba8e4d5a35dd695c39b94884b0ee60c69d168@2?relay-protocol=irn&symKey=7ff3e362f825ab868e20e767fe580d0311181632707e7c878cbeca0238d45b8b";

        assert!(matches!(
            PairingUri::from_str(uri),
            Err(ParseError::UnexpectedParameter(..))
        ));
    }
}
