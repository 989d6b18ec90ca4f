//! Synchronous caller-facing adapter for the PDCP security sublayer.
//!
//! Call sites work in bytes and 1-based bearers; the wire works in bits and
//! 0-based bearers. This module is the only place that conversion happens.

use crate::config::ClientConfig;
use crate::grpc::GrpcTransport;
use crate::proxy::{CipheringContext, ContextProxy, IntegrityContext};
use crate::transport::SecuTransport;
use secu_common::{
    bit_length_of, wire_bearer, AlgorithmId, Direction, Key128, Mac, Result, SecuError,
    StreamFrame,
};
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::warn;

/// Builds the wire frame for a caller PDU of `length` bytes.
fn caller_frame(
    buffer: &[u8],
    length: usize,
    bearer: u8,
    count: u32,
    direction: u32,
) -> Result<StreamFrame<'_>> {
    let message = buffer.get(..length).ok_or_else(|| {
        SecuError::invalid(
            "length",
            format!("{} exceeds buffer of {} bytes", length, buffer.len()),
        )
    })?;
    Ok(StreamFrame {
        count,
        bearer: wire_bearer(bearer)?,
        direction: Direction::try_from(direction)?,
        message,
        bit_length: bit_length_of(length)?,
    })
}

/// Blocking front end over a [`ContextProxy`], callable from any number of
/// non-async threads at once.
///
/// Calls made from inside a tokio runtime are refused: fallible calls return
/// a transport error, inits return `None`, and frees are skipped with a
/// warning. Dropping it inside a runtime is allowed.
pub struct BlockingSecurity<T: SecuTransport = GrpcTransport> {
    proxy: ContextProxy<T>,
    /// Always `Some` until drop.
    runtime: Option<Runtime>,
}

impl BlockingSecurity<GrpcTransport> {
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        Self::new(ContextProxy::from_config(config))
    }
}

impl<T: SecuTransport> BlockingSecurity<T> {
    pub fn new(proxy: ContextProxy<T>) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("secu-client")
            .enable_all()
            .build()
            .map_err(|e| SecuError::transport(format!("client runtime: {}", e)))?;
        Ok(Self {
            proxy,
            runtime: Some(runtime),
        })
    }

    pub fn proxy(&self) -> &ContextProxy<T> {
        &self.proxy
    }

    /// Drives `future` on the owned runtime. `block_on` panics inside
    /// another runtime, so that case is an error instead.
    fn run<F: Future>(&self, future: F) -> Result<F::Output> {
        if Handle::try_current().is_ok() {
            return Err(SecuError::transport(
                "blocking security call made from inside an async runtime",
            ));
        }
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| SecuError::transport("client runtime already shut down"))?;
        Ok(runtime.block_on(future))
    }

    pub fn connect(&self) -> Result<()> {
        self.run(self.proxy.connect())?
    }

    pub fn integrity_init(&self, algorithm: AlgorithmId, key: &Key128) -> Option<IntegrityContext> {
        self.run(self.proxy.integrity_init(algorithm, key))
            .unwrap_or_else(|e| {
                warn!("Integrity init refused: {}", e);
                None
            })
    }

    pub fn ciphering_init(&self, algorithm: AlgorithmId, key: &Key128) -> Option<CipheringContext> {
        self.run(self.proxy.ciphering_init(algorithm, key))
            .unwrap_or_else(|e| {
                warn!("Ciphering init refused: {}", e);
                None
            })
    }

    pub fn integrity_free(&self, context: IntegrityContext) {
        let id = context.id();
        if let Err(e) = self.run(self.proxy.integrity_free(context)) {
            warn!(%id, "Integrity free skipped: {}", e);
        }
    }

    pub fn ciphering_free(&self, context: CipheringContext) {
        let id = context.id();
        if let Err(e) = self.run(self.proxy.ciphering_free(context)) {
            warn!(%id, "Ciphering free skipped: {}", e);
        }
    }

    pub fn compute_integrity(
        &self,
        context: &IntegrityContext,
        frame: &StreamFrame<'_>,
    ) -> Result<Mac> {
        self.run(self.proxy.compute_integrity(context, frame))?
    }

    pub fn compute_encrypt(
        &self,
        context: &CipheringContext,
        frame: &StreamFrame<'_>,
    ) -> Result<Vec<u8>> {
        self.run(self.proxy.compute_encrypt(context, frame))?
    }
}

impl<T: SecuTransport> Drop for BlockingSecurity<T> {
    fn drop(&mut self) {
        // A plain drop blocks on worker shutdown, which panics inside a runtime.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// NIA adapter bound to one integrity algorithm.
pub struct NrIntegrity<T: SecuTransport = GrpcTransport> {
    security: Arc<BlockingSecurity<T>>,
    algorithm: AlgorithmId,
}

impl<T: SecuTransport> NrIntegrity<T> {
    pub fn new(security: Arc<BlockingSecurity<T>>, algorithm: AlgorithmId) -> Self {
        Self {
            security,
            algorithm,
        }
    }

    pub fn nia2(security: Arc<BlockingSecurity<T>>) -> Self {
        Self::new(security, AlgorithmId::NIA2)
    }

    pub fn algorithm(&self) -> AlgorithmId {
        self.algorithm
    }

    pub fn init(&self, key: &Key128) -> Option<IntegrityContext> {
        self.security.integrity_init(self.algorithm, key)
    }

    /// Writes the MAC of `buffer[..length]` into `out`.
    #[allow(clippy::too_many_arguments)]
    pub fn integrity(
        &self,
        context: &IntegrityContext,
        out: &mut Mac,
        buffer: &[u8],
        length: usize,
        bearer: u8,
        count: u32,
        direction: u32,
    ) -> Result<()> {
        let frame = caller_frame(buffer, length, bearer, count, direction)?;
        *out = self.security.compute_integrity(context, &frame)?;
        Ok(())
    }

    pub fn free(&self, context: IntegrityContext) {
        self.security.integrity_free(context)
    }
}

/// NEA adapter bound to one ciphering algorithm.
pub struct NrCiphering<T: SecuTransport = GrpcTransport> {
    security: Arc<BlockingSecurity<T>>,
    algorithm: AlgorithmId,
}

impl<T: SecuTransport> NrCiphering<T> {
    pub fn new(security: Arc<BlockingSecurity<T>>, algorithm: AlgorithmId) -> Self {
        Self {
            security,
            algorithm,
        }
    }

    pub fn nea2(security: Arc<BlockingSecurity<T>>) -> Self {
        Self::new(security, AlgorithmId::NEA2)
    }

    pub fn algorithm(&self) -> AlgorithmId {
        self.algorithm
    }

    pub fn init(&self, key: &Key128) -> Option<CipheringContext> {
        self.security.ciphering_init(self.algorithm, key)
    }

    /// Ciphers `buffer[..length]` in place.
    pub fn cipher(
        &self,
        context: &CipheringContext,
        buffer: &mut [u8],
        length: usize,
        bearer: u8,
        count: u32,
        direction: u32,
    ) -> Result<()> {
        let ciphertext = {
            let frame = caller_frame(buffer, length, bearer, count, direction)?;
            self.security.compute_encrypt(context, &frame)?
        };
        buffer[..ciphertext.len()].copy_from_slice(&ciphertext);
        Ok(())
    }

    pub fn free(&self, context: CipheringContext) {
        self.security.ciphering_free(context)
    }
}

/// One integrity and one ciphering context created and deleted together.
/// Either may be absent if its init failed.
#[derive(Debug)]
pub struct SecurityContainer {
    integrity: Option<IntegrityContext>,
    ciphering: Option<CipheringContext>,
}

impl SecurityContainer {
    pub fn init<T: SecuTransport>(
        security: &BlockingSecurity<T>,
        ciphering_algorithm: AlgorithmId,
        integrity_algorithm: AlgorithmId,
        ciphering_key: &Key128,
        integrity_key: &Key128,
    ) -> Self {
        Self {
            integrity: security.integrity_init(integrity_algorithm, integrity_key),
            ciphering: security.ciphering_init(ciphering_algorithm, ciphering_key),
        }
    }

    pub fn integrity(&self) -> Option<&IntegrityContext> {
        self.integrity.as_ref()
    }

    pub fn ciphering(&self) -> Option<&CipheringContext> {
        self.ciphering.as_ref()
    }

    pub fn delete<T: SecuTransport>(self, security: &BlockingSecurity<T>) {
        if let Some(integrity) = self.integrity {
            security.integrity_free(integrity);
        }
        if let Some(ciphering) = self.ciphering {
            security.ciphering_free(ciphering);
        }
    }
}
