//! Transport seam between the context proxy and the broker.

use async_trait::async_trait;
use secu_common::{AlgorithmId, ContextId, Key128, Result, StreamCipherParams};

/// One request/response call per broker operation.
///
/// Implementations connect lazily: the first call (or [`connect`]) opens the
/// channel, concurrent first callers wait for it, and every later call reuses
/// it.
///
/// [`connect`]: SecuTransport::connect
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecuTransport: Send + Sync + 'static {
    /// Opens the channel now instead of on first use.
    async fn connect(&self) -> Result<()>;

    /// Returns the raw wire id; `0` means the broker could not create it.
    async fn integrity_init(&self, algorithm: AlgorithmId, key: Key128) -> Result<u64>;

    async fn ciphering_init(&self, algorithm: AlgorithmId, key: Key128) -> Result<u64>;

    async fn integrity_free(&self, id: ContextId) -> Result<()>;

    async fn ciphering_free(&self, id: ContextId) -> Result<()>;

    /// Raw MAC bytes as returned by the broker, unchecked.
    async fn compute_integrity(
        &self,
        algorithm: AlgorithmId,
        params: StreamCipherParams,
    ) -> Result<Vec<u8>>;

    /// Raw ciphertext bytes as returned by the broker, unchecked.
    async fn compute_encrypt(
        &self,
        algorithm: AlgorithmId,
        params: StreamCipherParams,
    ) -> Result<Vec<u8>>;
}
