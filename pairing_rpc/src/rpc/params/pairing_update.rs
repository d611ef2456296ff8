//! Peer metadata updates on a settled topic.

use {
    super::{IrnMetadata, Metadata},
    serde::{Deserialize, Serialize},
};

pub(super) const IRN_REQUEST_METADATA: IrnMetadata = IrnMetadata {
    tag: 1004,
    ttl: 86400,
    prompt: false,
};

pub(super) const IRN_RESPONSE_METADATA: IrnMetadata = IrnMetadata {
    tag: 1005,
    ttl: 86400,
    prompt: false,
};

/// The only updatable field of a settled pairing is the peer metadata.
#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PeerUpdate {
    pub metadata: Metadata,
}

#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct PairingUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub peer: Option<PeerUpdate>,
}

#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PairingUpdateRequest {
    pub update: PairingUpdate,
}

#[cfg(test)]
mod tests {
    use super::*;

    use super::super::tests::param_serde_test;
    use anyhow::Result;

    #[test]
    fn test_serde_pairing_update_request() -> Result<()> {
        let json = r#"
        {
            "update": {
                "peer": {
                    "metadata": {
                        "description": "Example wallet",
                        "url": "https://example.org",
                        "icons": [
                            "https://example.org/icon.png"
                        ],
                        "name": "Example"
                    }
                }
            }
        }
        "#;

        param_serde_test::<PairingUpdateRequest>(json)
    }
}
