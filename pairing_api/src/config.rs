//! Controller configuration.

use {
    pairing_rpc::rpc::{Metadata, Relay},
    std::collections::BTreeSet,
};

/// Default time-to-live of a pairing: 30 days.
pub const DEFAULT_TTL: u64 = 30 * 86400;

/// Session-layer method a fresh pairing whitelists, so that the peer can
/// open the higher-level negotiation over the settled topic.
pub const SESSION_PROPOSE_METHOD: &str = "session_propose";

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Relay descriptor attached to proposals when the caller gives none.
    pub relay: Relay,

    /// Applied to proposals in seconds; settled expiry is the proposal
    /// creation time plus this.
    pub ttl: u64,

    /// Application-level JSON-RPC methods a freshly proposed pairing
    /// permits. Both sides must agree on this set out of band.
    pub proposed_methods: BTreeSet<String>,

    /// Application metadata attached to our side of the handshake.
    pub metadata: Option<Metadata>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            relay: Relay::default(),
            ttl: DEFAULT_TTL,
            proposed_methods: [SESSION_PROPOSE_METHOD.to_owned()].into_iter().collect(),
            metadata: None,
        }
    }
}
