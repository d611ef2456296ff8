//! Data structures shared between the pairing methods.

use {
    super::RELAY_PROTOCOL,
    crate::domain::Topic,
    serde::{Deserialize, Serialize},
    std::collections::BTreeSet,
};

#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub description: String,
    pub url: String,
    pub icons: Vec<String>,
    pub name: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone)]
pub struct Relay {
    pub protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub data: Option<String>,
}

impl Default for Relay {
    fn default() -> Self {
        Self {
            protocol: RELAY_PROTOCOL.to_owned(),
            data: None,
        }
    }
}

/// One side of a pairing: the hex-encoded x25519 public key plus optional
/// application metadata.
#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Peer {
    pub public_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone, Default)]
pub struct JsonRpcPermissions {
    pub methods: BTreeSet<String>,
}

/// Whitelist of application-level JSON-RPC methods honoured on a settled
/// topic. Membership is checked on every inbound `pairing_payload`.
#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone, Default)]
pub struct PairingPermissions {
    pub jsonrpc: JsonRpcPermissions,
}

impl PairingPermissions {
    pub fn permits(&self, method: &str) -> bool {
        self.jsonrpc.methods.contains(method)
    }
}

/// Out-of-band signal carrying the proposal to the responder.
#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone)]
#[serde(tag = "method", content = "params")]
pub enum PairingSignal {
    #[serde(rename = "pairing_uri")]
    Uri(PairingSignalParams),
}

impl PairingSignal {
    pub fn uri(uri: String) -> Self {
        Self::Uri(PairingSignalParams { uri })
    }

    pub fn uri_str(&self) -> &str {
        match self {
            Self::Uri(params) => &params.uri,
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PairingSignalParams {
    pub uri: String,
}

/// A pairing proposal: everything the responder needs to answer on the
/// proposal topic.
#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PairingProposal {
    pub topic: Topic,
    pub relay: Relay,
    pub proposer: Peer,
    pub signal: PairingSignal,
    pub permissions: PairingPermissions,
    pub ttl: u64,
}
