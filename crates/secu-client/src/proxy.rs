//! Client-side context proxy.
//!
//! Mirrors the broker's context lifecycle through typed handles and applies
//! the configured [`FailurePolicy`] when a compute cannot be served:
//!
//! | Failure                                   | `FailOpen`          | `FailClosed` |
//! |-------------------------------------------|---------------------|--------------|
//! | transport, remote error, short response   | zero MAC / plaintext| error        |
//! | invalid local parameters                  | error               | error        |
//!
//! Init never degrades: it yields `None` when no context could be created.
//! Free is best effort and never reports failure.

use crate::config::{ClientConfig, FailurePolicy, RetryPolicy};
use crate::grpc::GrpcTransport;
use crate::transport::SecuTransport;
use secu_common::{
    AlgorithmId, ContextId, ContextKind, Key128, Mac, Result, SecuError, StreamCipherParams,
    StreamFrame, MAC_LEN,
};
use std::future::Future;
use tracing::{debug, warn};

/// Live remote integrity context. Consumed by
/// [`ContextProxy::integrity_free`].
#[derive(Debug, PartialEq, Eq)]
pub struct IntegrityContext {
    id: ContextId,
    algorithm: AlgorithmId,
}

impl IntegrityContext {
    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn algorithm(&self) -> AlgorithmId {
        self.algorithm
    }
}

/// Live remote ciphering context. Consumed by
/// [`ContextProxy::ciphering_free`].
#[derive(Debug, PartialEq, Eq)]
pub struct CipheringContext {
    id: ContextId,
    algorithm: AlgorithmId,
}

impl CipheringContext {
    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn algorithm(&self) -> AlgorithmId {
        self.algorithm
    }
}

/// Keeps the first `expected` bytes of a response.
fn take_exact(mut raw: Vec<u8>, expected: usize) -> Result<Vec<u8>> {
    if raw.len() < expected {
        return Err(SecuError::MalformedResponse {
            expected,
            actual: raw.len(),
        });
    }
    raw.truncate(expected);
    Ok(raw)
}

pub struct ContextProxy<T: SecuTransport> {
    transport: T,
    policy: FailurePolicy,
    retry: RetryPolicy,
}

impl ContextProxy<GrpcTransport> {
    /// gRPC-backed proxy; nothing is dialed until first use.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            GrpcTransport::new(config.clone()),
            config.failure_policy,
            config.retry.clone(),
        )
    }
}

impl<T: SecuTransport> ContextProxy<T> {
    pub fn new(transport: T, policy: FailurePolicy, retry: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            retry,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Dials the broker now. Optional: every other call connects lazily.
    pub async fn connect(&self) -> Result<()> {
        self.transport.connect().await
    }

    pub async fn integrity_init(
        &self,
        algorithm: AlgorithmId,
        key: &Key128,
    ) -> Option<IntegrityContext> {
        let created = self.transport.integrity_init(algorithm, *key).await;
        accept_init(ContextKind::Integrity, algorithm, created)
            .map(|id| IntegrityContext { id, algorithm })
    }

    pub async fn ciphering_init(
        &self,
        algorithm: AlgorithmId,
        key: &Key128,
    ) -> Option<CipheringContext> {
        let created = self.transport.ciphering_init(algorithm, *key).await;
        accept_init(ContextKind::Ciphering, algorithm, created)
            .map(|id| CipheringContext { id, algorithm })
    }

    pub async fn integrity_free(&self, context: IntegrityContext) {
        let id = context.id;
        let freed = self
            .with_retry("integrity_free", || self.transport.integrity_free(id))
            .await;
        log_free(ContextKind::Integrity, id, freed);
    }

    pub async fn ciphering_free(&self, context: CipheringContext) {
        let id = context.id;
        let freed = self
            .with_retry("ciphering_free", || self.transport.ciphering_free(id))
            .await;
        log_free(ContextKind::Ciphering, id, freed);
    }

    /// Remote MAC over `frame`, or the all-zero MAC under `FailOpen`.
    pub async fn compute_integrity(
        &self,
        context: &IntegrityContext,
        frame: &StreamFrame<'_>,
    ) -> Result<Mac> {
        let params = outgoing(context.id, frame)?;
        let result = self
            .with_retry("compute_integrity", || {
                self.transport
                    .compute_integrity(context.algorithm, params.clone())
            })
            .await
            .and_then(|raw| take_exact(raw, MAC_LEN))
            .map(|bytes| {
                let mut mac = [0u8; MAC_LEN];
                mac.copy_from_slice(&bytes);
                mac
            });
        self.degrade(result, "compute_integrity", context.id, || [0u8; MAC_LEN])
    }

    /// Remote ciphering of `frame`, or the plaintext unchanged under
    /// `FailOpen`. The output is always `ceil(bit_length / 8)` bytes.
    pub async fn compute_encrypt(
        &self,
        context: &CipheringContext,
        frame: &StreamFrame<'_>,
    ) -> Result<Vec<u8>> {
        let params = outgoing(context.id, frame)?;
        let expected = params.required_bytes();
        let result = self
            .with_retry("compute_encrypt", || {
                self.transport
                    .compute_encrypt(context.algorithm, params.clone())
            })
            .await
            .and_then(|raw| take_exact(raw, expected));
        self.degrade(result, "compute_encrypt", context.id, || params.message.clone())
    }

    fn degrade<R>(
        &self,
        result: Result<R>,
        op: &'static str,
        id: ContextId,
        fallback: impl FnOnce() -> R,
    ) -> Result<R> {
        match (result, self.policy) {
            (Ok(value), _) => Ok(value),
            (Err(e), FailurePolicy::FailOpen) => {
                warn!(
                    op,
                    %id,
                    error = %e,
                    kind = e.kind_label(),
                    "Remote compute failed, returning degraded output"
                );
                Ok(fallback())
            }
            (Err(e), FailurePolicy::FailClosed) => Err(e),
        }
    }

    /// Repeats `call` on retryable transport errors, up to the configured
    /// number of attempts.
    async fn with_retry<R, F, Fut>(&self, op: &'static str, mut call: F) -> Result<R>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    debug!(op, attempt, error = %e, "Retrying after transport failure");
                    tokio::time::sleep(self.retry.backoff()).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

fn accept_init(kind: ContextKind, algorithm: AlgorithmId, created: Result<u64>) -> Option<ContextId> {
    match created.map(ContextId::from_wire) {
        Ok(Some(id)) => {
            debug!(%kind, %algorithm, %id, "Remote context created");
            Some(id)
        }
        Ok(None) => {
            warn!(%kind, %algorithm, "Broker could not create context");
            None
        }
        Err(e) => {
            warn!(%kind, %algorithm, error = %e, "Context init failed");
            None
        }
    }
}

fn log_free(kind: ContextKind, id: ContextId, freed: Result<()>) {
    match freed {
        Ok(()) => debug!(%kind, %id, "Remote context freed"),
        Err(e) => warn!(%kind, %id, error = %e, "Remote free failed, broker may keep the context"),
    }
}

/// Validates `frame` and trims the message to `ceil(bit_length / 8)` bytes.
fn outgoing(context: ContextId, frame: &StreamFrame<'_>) -> Result<StreamCipherParams> {
    let mut params = StreamCipherParams {
        context,
        count: frame.count,
        bearer: frame.bearer,
        direction: frame.direction,
        message: Vec::new(),
        bit_length: frame.bit_length,
    };
    let needed = params.required_bytes();
    let message = frame.message.get(..needed).ok_or_else(|| {
        SecuError::invalid(
            "message",
            format!(
                "{} bytes do not cover bit_length {}",
                frame.message.len(),
                frame.bit_length
            ),
        )
    })?;
    params.message = message.to_vec();
    params.validate()?;
    Ok(params)
}
