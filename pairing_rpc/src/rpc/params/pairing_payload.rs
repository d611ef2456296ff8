//! Application traffic relayed opaquely over a settled topic.

use {
    super::{IrnMetadata, ResponseParams},
    crate::domain::MessageId,
    serde::{Deserialize, Serialize},
    std::sync::Arc,
};

pub(super) const IRN_REQUEST_METADATA: IrnMetadata = IrnMetadata {
    tag: 1002,
    ttl: 86400,
    prompt: true,
};

pub(super) const IRN_RESPONSE_METADATA: IrnMetadata = IrnMetadata {
    tag: 1003,
    ttl: 86400,
    prompt: false,
};

/// Application-level JSON-RPC request carried inside `pairing_payload`.
///
/// Methods are free-form; the receiving side checks them against the
/// pairing permissions. Parsing of the parameters is deferred to the
/// application.
#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone)]
pub struct AppRequest {
    pub id: MessageId,
    pub jsonrpc: Arc<str>,
    pub method: String,
    pub params: serde_json::Value,
}

impl AppRequest {
    pub fn new(method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            id: MessageId::generate(),
            jsonrpc: crate::rpc::JSON_RPC_VERSION.clone(),
            method: method.into(),
            params,
        }
    }
}

/// Application-level JSON-RPC response carried inside `pairing_payload`.
#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone)]
pub struct AppResponse {
    pub id: MessageId,
    pub jsonrpc: Arc<str>,
    #[serde(flatten)]
    pub params: ResponseParams,
}

/// The payload wrapped by `pairing_payload`: either an application request,
/// subject to the permission whitelist, or a response, relayed verbatim.
#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone)]
#[serde(untagged)]
pub enum AppPayload {
    Request(AppRequest),
    Response(AppResponse),
}

impl From<AppRequest> for AppPayload {
    fn from(value: AppRequest) -> Self {
        Self::Request(value)
    }
}

impl From<AppResponse> for AppPayload {
    fn from(value: AppResponse) -> Self {
        Self::Response(value)
    }
}

#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PairingPayloadRequest {
    pub payload: AppPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    use super::super::tests::param_serde_test;
    use anyhow::Result;

    #[test]
    fn test_serde_pairing_payload_request() -> Result<()> {
        let json = r#"
        {
            "payload": {
                "id": 1675757972688031,
                "jsonrpc": "2.0",
                "method": "session_propose",
                "params": {
                    "proposal": "opaque"
                }
            }
        }
        "#;

        param_serde_test::<PairingPayloadRequest>(json)
    }

    #[test]
    fn app_payload_discriminates_requests_and_responses() -> Result<()> {
        let request: AppPayload = serde_json::from_str(
            r#"{"id":1,"jsonrpc":"2.0","method":"foo_bar","params":null}"#,
        )?;
        assert!(matches!(request, AppPayload::Request(_)));

        let response: AppPayload =
            serde_json::from_str(r#"{"id":1,"jsonrpc":"2.0","result":true}"#)?;
        assert!(matches!(response, AppPayload::Response(_)));

        Ok(())
    }
}
