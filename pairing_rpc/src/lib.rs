//! Wire-protocol types for the pairing SDK: topic and message id domain
//! newtypes, the JSON-RPC 2.0 codec, the pairing method parameters and the
//! shareable pairing URI.

pub mod domain;
pub mod rpc;
pub mod uri;
