pub(super) mod pairing_delete;
pub(super) mod pairing_payload;
pub(super) mod pairing_respond;
pub(super) mod pairing_update;
pub(super) mod shared_types;

pub use {
    pairing_delete::*, pairing_payload::*, pairing_respond::*, pairing_update::*, shared_types::*,
};

use {
    paste::paste,
    serde::{Deserialize, Serialize},
    serde_json::Value,
    std::result::Result,
};

/// Default relay protocol attached to proposals and URIs when the caller
/// does not specify one.
pub const RELAY_PROTOCOL: &str = "irn";

/// Methods of the pairing protocol itself. These are honoured on a settled
/// topic regardless of the permission whitelist.
pub const RESERVED_METHODS: [&str; 4] = [
    "pairing_respond",
    "pairing_payload",
    "pairing_update",
    "pairing_delete",
];

/// Stable reason attached to a pending record reaped after local settlement.
pub const REASON_SETTLED: &str = "settled";
/// Stable reason attached to a pending record reaped after the remote
/// acknowledgement.
pub const REASON_ACKNOWLEDGED: &str = "acknowledged";
/// Stable reason carried by a failure outcome when the responder declines.
pub const REASON_NOT_APPROVED: &str = "not_approved";

/// Error codes carried by JSON-RPC error replies.
pub mod error_code {
    pub const UNAUTHORIZED_METHOD: u64 = 3001;
    pub const UNKNOWN_METHOD: u64 = 3002;
    pub const INVALID_UPDATE: u64 = 1001;
}

/// Errors covering pairing payload parameter conversion issues.
#[derive(Debug, thiserror::Error)]
pub enum ParamsError {
    /// Pairing API serialization/deserialization issues.
    #[error("Failure serializing/deserializing pairing parameters: {0}")]
    Serde(#[from] serde_json::Error),
    /// Pairing API invalid response tag.
    #[error("Response tag={0} does not match any of the pairing methods")]
    ResponseTag(u32),
}

/// Relay protocol metadata.
pub trait RelayProtocolMetadata {
    /// Retrieves IRN relay protocol metadata.
    ///
    /// Every method must return corresponding IRN metadata.
    fn irn_metadata(&self) -> IrnMetadata;
}

pub trait RelayProtocolHelpers {
    type Params;

    /// Converts "unnamed" payload parameters into typed.
    ///
    /// Example: success and error response payload does not specify the
    /// method. Thus the only way to deserialize the data into typed
    /// parameters, is to use the tag to determine the response method.
    ///
    /// This is a convenience method, so that users don't have to deal
    /// with the tags directly.
    fn irn_try_from_tag(value: Value, tag: u32) -> Result<Self::Params, ParamsError>;
}

/// Relay IRN protocol metadata: the tag, time-to-live and push-prompt flag
/// attached to every published message.
#[derive(Debug, Clone, Copy)]
pub struct IrnMetadata {
    pub tag: u32,
    pub ttl: u64,
    pub prompt: bool,
}

// Convenience macro to de-duplicate implementation for different parameter sets.
macro_rules! impl_relay_protocol_metadata {
    ($param_type:ty,$meta:ident) => {
        paste! {
            impl RelayProtocolMetadata for $param_type {
                fn irn_metadata(&self) -> IrnMetadata {
                    match self {
                        [<$param_type>]::PairingRespond(_) => pairing_respond::[<IRN_ $meta:upper _METADATA>],
                        [<$param_type>]::PairingPayload(_) => pairing_payload::[<IRN_ $meta:upper _METADATA>],
                        [<$param_type>]::PairingUpdate(_) => pairing_update::[<IRN_ $meta:upper _METADATA>],
                        [<$param_type>]::PairingDelete(_) => pairing_delete::[<IRN_ $meta:upper _METADATA>],
                    }
                }
            }
        }
    }
}

// Convenience macro to de-duplicate implementation for different parameter sets.
macro_rules! impl_relay_protocol_helpers {
    ($param_type:ty) => {
        paste! {
            impl RelayProtocolHelpers for $param_type {
                type Params = Self;

                fn irn_try_from_tag(value: Value, tag: u32) -> Result<Self::Params, ParamsError> {
                    if tag == pairing_respond::IRN_RESPONSE_METADATA.tag {
                        Ok(Self::PairingRespond(serde_json::from_value(value)?))
                    } else if tag == pairing_payload::IRN_RESPONSE_METADATA.tag {
                        Ok(Self::PairingPayload(serde_json::from_value(value)?))
                    } else if tag == pairing_update::IRN_RESPONSE_METADATA.tag {
                        Ok(Self::PairingUpdate(serde_json::from_value(value)?))
                    } else if tag == pairing_delete::IRN_RESPONSE_METADATA.tag {
                        Ok(Self::PairingDelete(serde_json::from_value(value)?))
                    } else {
                        Err(ParamsError::ResponseTag(tag))
                    }
                }
            }
        }
    };
}

/// Pairing API request parameters.
///
/// Method names are fixed wire strings; the params shape depends on the
/// method.
#[derive(Debug, Serialize, Eq, Deserialize, Clone, PartialEq)]
#[serde(tag = "method", content = "params")]
pub enum RequestParams {
    #[serde(rename = "pairing_respond")]
    PairingRespond(PairingOutcome),
    #[serde(rename = "pairing_payload")]
    PairingPayload(PairingPayloadRequest),
    #[serde(rename = "pairing_update")]
    PairingUpdate(PairingUpdateRequest),
    #[serde(rename = "pairing_delete")]
    PairingDelete(PairingDeleteRequest),
}
impl_relay_protocol_metadata!(RequestParams, request);

/// https://www.jsonrpc.org/specification#response_object
///
/// JSON RPC 2.0 response object can either carry success or error data.
/// Please note, that relay protocol metadata is used to disambiguate the
/// response data.
///
/// For example:
/// `RelayProtocolHelpers::irn_try_from_tag` is used to deserialize an opaque
/// response data into the typed parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseParams {
    /// A response with a result.
    #[serde(rename = "result")]
    Success(Value),

    /// A response for a failed request.
    #[serde(rename = "error")]
    Err(Value),
}

/// Typed success response parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseParamsSuccess {
    PairingRespond(bool),
    PairingPayload(bool),
    PairingUpdate(bool),
    PairingDelete(bool),
}
impl_relay_protocol_metadata!(ResponseParamsSuccess, response);
impl_relay_protocol_helpers!(ResponseParamsSuccess);

impl TryFrom<ResponseParamsSuccess> for ResponseParams {
    type Error = ParamsError;

    fn try_from(value: ResponseParamsSuccess) -> Result<Self, Self::Error> {
        Ok(Self::Success(serde_json::to_value(value)?))
    }
}

/// Response error data.
#[derive(Debug, Clone, Eq, Serialize, Deserialize, PartialEq)]
pub struct ErrorParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub code: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub message: Option<String>,
}

/// Typed error response parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseParamsError {
    PairingRespond(ErrorParams),
    PairingPayload(ErrorParams),
    PairingUpdate(ErrorParams),
    PairingDelete(ErrorParams),
}
impl_relay_protocol_metadata!(ResponseParamsError, response);
impl_relay_protocol_helpers!(ResponseParamsError);

impl TryFrom<ResponseParamsError> for ResponseParams {
    type Error = ParamsError;

    fn try_from(value: ResponseParamsError) -> Result<Self, Self::Error> {
        Ok(Self::Err(serde_json::to_value(value)?))
    }
}
