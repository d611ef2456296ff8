//! Controller errors.

use {
    crate::{
        crypto::{keys::KeyError, payload::PayloadError},
        relay::RelayError,
        store::StoreError,
    },
    pairing_rpc::rpc::ParamsError,
};

/// Possible pairing controller errors.
///
/// Protocol errors on inbound traffic are recovered locally (replied to the
/// peer as JSON-RPC errors) and never surface here; these are the failures
/// reported to local callers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Topic absent from the relevant store.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Inbound method missing from the pairing permissions.
    #[error("Unauthorized JSON-RPC Method Requested: {0}")]
    Unauthorized(String),

    /// Malformed `pairing_update` parameters.
    #[error("Invalid pairing update request params")]
    InvalidUpdate,

    /// The peer answered the proposal with a failure outcome.
    #[error("{0}")]
    RemoteFailure(String),

    /// Local failure while deriving or recording the settlement.
    #[error("Pairing settlement failed: {0}")]
    SettlementFailure(String),

    /// The peer rejected our `pairing_respond` with an error response.
    #[error("Pairing acknowledgement failed: {0}")]
    Acknowledgement(String),

    /// The proposal was torn down before the responder answered.
    #[error("Pairing proposal was abandoned before a response arrived")]
    ProposalAbandoned,

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Crypto(#[from] PayloadError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Params(#[from] ParamsError),

    #[error(transparent)]
    Relay(#[from] RelayError),
}
