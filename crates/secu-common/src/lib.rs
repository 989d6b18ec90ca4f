//! Shared types for the remote link-layer security offload.
//!
//! The PDCP security sublayer no longer computes integrity or ciphering
//! locally. It holds an opaque [`ContextId`] that names state living in the
//! broker, and sends per-frame [`StreamCipherParams`] across the transport.
//!
//! - [`ContextId`]: non-zero, epoch-tagged reference to a live context
//! - [`ContextKind`]: integrity or ciphering table
//! - [`AlgorithmId`]: opaque algorithm number forwarded to the engine
//! - [`StreamCipherParams`] / [`StreamFrame`]: per-frame inputs
//! - [`SecuError`]: every failure kind, from engine to transport

mod error;
mod ids;
mod params;

pub use error::{Result, SecuError};
pub use ids::{AlgorithmId, ContextId, ContextKind, EPOCH_BITS, MAX_SEQUENCE, SEQUENCE_BITS};
pub use params::{
    bit_length_of, key_from_slice, required_bytes, wire_bearer, Direction, Key128, Mac,
    StreamCipherParams, StreamFrame, KEY_LEN, MAC_LEN, MAX_CALLER_BEARER, MAX_WIRE_BEARER,
};
