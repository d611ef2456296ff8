//! Pairing controller: establishes, maintains, updates and tears down
//! long-lived end-to-end-encrypted pairings between two peers talking
//! through an untrusted relay.
//!
//! The controller owns two keyed record stores. A *pending* record straddles
//! the handshake on a fresh random proposal topic; once the responder
//! answers, both sides derive the shared key and move to a *settled* record
//! on the topic `sha256(sharedKey)`. All post-handshake traffic is encrypted
//! with the shared key and routed through [`PairingController::handle_message`].

pub mod config;
pub mod controller;
pub mod crypto;
pub mod error;
pub mod pairing;
pub mod relay;
pub mod store;

pub use {
    config::ControllerConfig,
    controller::{
        CreateParams, DeleteParams, PairingController, PairingEvent, RespondParams, UpdateParams,
    },
    error::Error,
    pairing::{PendingPairing, SettledPairing},
};
