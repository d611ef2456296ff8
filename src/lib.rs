//! Umbrella crate for the pairing SDK.
//!
//! Re-exports the member crates so that downstream users can depend on a
//! single package and toggle the wire-protocol types and the controller
//! independently via features.

#[cfg(feature = "api")]
pub use pairing_api as api;
#[cfg(feature = "rpc")]
pub use pairing_rpc as rpc;
