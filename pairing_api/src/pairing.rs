//! Pairing records held by the two subscription stores.

use {
    crate::crypto::keys::{Keypair, SharedKey},
    pairing_rpc::{
        domain::Topic,
        rpc::{PairingOutcome, PairingPermissions, PairingProposal, Peer, Relay},
    },
};

/// A pairing mid-handshake, keyed by the proposal topic.
///
/// Created as `Proposed` by the proposer and as `Responded` by the
/// responder; the proposer moves to `Responded` when the answer arrives.
/// The record is reaped once the settlement is observed locally,
/// acknowledged remotely or rejected.
#[derive(Debug, Clone)]
pub enum PendingPairing {
    Proposed(ProposedPairing),
    Responded(RespondedPairing),
}

#[derive(Debug, Clone)]
pub struct ProposedPairing {
    pub topic: Topic,
    pub relay: Relay,
    /// Our side of the key agreement.
    pub keypair: Keypair,
    pub proposal: PairingProposal,
}

#[derive(Debug, Clone)]
pub struct RespondedPairing {
    pub topic: Topic,
    pub relay: Relay,
    pub keypair: Keypair,
    pub proposal: PairingProposal,
    pub outcome: PairingOutcome,
}

impl PendingPairing {
    pub fn topic(&self) -> &Topic {
        match self {
            Self::Proposed(p) => &p.topic,
            Self::Responded(r) => &r.topic,
        }
    }

    pub fn keypair(&self) -> &Keypair {
        match self {
            Self::Proposed(p) => &p.keypair,
            Self::Responded(r) => &r.keypair,
        }
    }

    pub fn proposal(&self) -> &PairingProposal {
        match self {
            Self::Proposed(p) => &p.proposal,
            Self::Responded(r) => &r.proposal,
        }
    }

    pub fn is_responded(&self) -> bool {
        matches!(self, Self::Responded(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            Self::Responded(RespondedPairing {
                outcome: PairingOutcome::Failure(_),
                ..
            })
        )
    }

    pub fn outcome(&self) -> Option<&PairingOutcome> {
        match self {
            Self::Proposed(_) => None,
            Self::Responded(r) => Some(&r.outcome),
        }
    }

    /// The responded variant of this record, keeping topic, keys and
    /// proposal.
    pub fn with_outcome(self, outcome: PairingOutcome) -> Self {
        let (topic, relay, keypair, proposal) = match self {
            Self::Proposed(p) => (p.topic, p.relay, p.keypair, p.proposal),
            Self::Responded(r) => (r.topic, r.relay, r.keypair, r.proposal),
        };
        Self::Responded(RespondedPairing {
            topic,
            relay,
            keypair,
            proposal,
            outcome,
        })
    }
}

/// A live pairing, keyed by `sha256(sharedKey)`.
#[derive(Debug, Clone)]
pub struct SettledPairing {
    pub topic: Topic,
    pub relay: Relay,
    pub shared_key: SharedKey,
    /// Our side of the key agreement.
    pub keypair: Keypair,
    pub peer: Peer,
    pub permissions: PairingPermissions,
    /// Unix timestamp; identical on both sides.
    pub expiry: u64,
}
