//! Crypto engine seam.
//!
//! The broker never computes anything itself. It hands an opaque algorithm
//! id and an opaque engine context to a [`CryptoEngine`], which owns its
//! own thread-safety contract: the broker may call `compute_*` concurrently
//! on the same context from several tasks.

mod nr;

pub use nr::{NrContext, NrSecurityEngine};

use secu_common::{AlgorithmId, ContextKind, Key128, StreamFrame};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("unsupported algorithm {0}")]
    UnsupportedAlgorithm(AlgorithmId),

    #[error("{0}")]
    Failed(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

pub trait CryptoEngine: Send + Sync + 'static {
    /// Per-context engine state, e.g. an expanded key.
    type Context: Send + Sync + 'static;

    fn integrity_init(&self, algorithm: AlgorithmId, key: &Key128) -> EngineResult<Self::Context>;

    fn ciphering_init(&self, algorithm: AlgorithmId, key: &Key128) -> EngineResult<Self::Context>;

    /// Returns the full integrity output; the broker keeps the first four
    /// bytes.
    fn compute_integrity(
        &self,
        algorithm: AlgorithmId,
        context: &Self::Context,
        frame: &StreamFrame<'_>,
    ) -> EngineResult<Vec<u8>>;

    /// Writes the ciphertext into `out`, which is exactly
    /// `ceil(frame.bit_length / 8)` bytes long.
    fn compute_encrypt(
        &self,
        algorithm: AlgorithmId,
        context: &Self::Context,
        frame: &StreamFrame<'_>,
        out: &mut [u8],
    ) -> EngineResult<()>;

    /// Called exactly once per context, after its table entry is erased and
    /// outside any broker lock. Computes still in flight hold their own
    /// reference, so the context is dropped when the last of them finishes.
    fn release(&self, kind: ContextKind, algorithm: AlgorithmId, context: Arc<Self::Context>) {
        let _ = (kind, algorithm);
        drop(context);
    }
}
