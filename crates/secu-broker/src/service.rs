//! `secu.v1.SecuService` handler.
//!
//! Thin translation between wire messages and [`ContextBroker`] calls:
//!
//! | Broker result            | Wire result             |
//! |--------------------------|-------------------------|
//! | `InitFailure`            | `OK`, `ctx_id = 0`      |
//! | `UnknownContext`         | `NOT_FOUND`             |
//! | `InvalidParameter`       | `INVALID_ARGUMENT`      |
//! | `IdSpaceExhausted`       | `RESOURCE_EXHAUSTED`    |
//! | `EngineFailure`          | `INTERNAL`              |

use crate::broker::ContextBroker;
use crate::engine::CryptoEngine;
use secu_common::{
    key_from_slice, AlgorithmId, ContextId, ContextKind, Direction, SecuError, StreamCipherParams,
};
use secu_proto::{
    EncryptRequest, EncryptResponse, IntegrityRequest, IntegrityResponse, SecuService,
    StreamCipher, StreamFreeRequest, StreamFreeResponse, StreamInitRequest, StreamInitResponse,
};
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{debug, warn};

/// Maps a broker error onto a gRPC status.
pub fn status_from_error(err: &SecuError) -> Status {
    match err {
        SecuError::UnknownContext { .. } => Status::not_found(err.to_string()),
        SecuError::InvalidParameter { .. } => Status::invalid_argument(err.to_string()),
        SecuError::IdSpaceExhausted { .. } => Status::resource_exhausted(err.to_string()),
        SecuError::EngineFailure(_) => Status::internal(err.to_string()),
        SecuError::InitFailure { .. } => Status::failed_precondition(err.to_string()),
        SecuError::Config(_)
        | SecuError::Transport { .. }
        | SecuError::MalformedResponse { .. } => Status::internal(err.to_string()),
    }
}

fn into_status(err: SecuError) -> Status {
    status_from_error(&err)
}

/// Decodes the wire `StreamCipher` block into validated-range parameters.
///
/// Wire id `0` is never live, so it maps straight to `UnknownContext`.
fn stream_params(kind: ContextKind, sc: Option<StreamCipher>) -> Result<StreamCipherParams, SecuError> {
    let sc = sc.ok_or_else(|| SecuError::invalid("sc", "missing stream cipher parameters"))?;
    let context = ContextId::from_wire(sc.ctx_id).ok_or(SecuError::UnknownContext {
        kind,
        id: sc.ctx_id,
    })?;
    let bearer = u8::try_from(sc.bearer)
        .map_err(|_| SecuError::invalid("bearer", format!("wire bearer {} out of range", sc.bearer)))?;

    Ok(StreamCipherParams {
        context,
        count: sc.count,
        bearer,
        direction: Direction::try_from(sc.direction)?,
        message: sc.message,
        bit_length: sc.blength,
    })
}

pub struct SecuGrpcService<E: CryptoEngine> {
    broker: Arc<ContextBroker<E>>,
}

impl<E: CryptoEngine> SecuGrpcService<E> {
    pub fn new(broker: Arc<ContextBroker<E>>) -> Self {
        Self { broker }
    }

    pub fn broker(&self) -> &Arc<ContextBroker<E>> {
        &self.broker
    }

    fn init(&self, kind: ContextKind, req: StreamInitRequest) -> Result<StreamInitResponse, Status> {
        let algorithm = AlgorithmId(req.algorithm);
        let key = key_from_slice(&req.key).map_err(into_status)?;

        let created = match kind {
            ContextKind::Integrity => self.broker.integrity_init(algorithm, &key),
            ContextKind::Ciphering => self.broker.ciphering_init(algorithm, &key),
        };

        match created {
            Ok(id) => Ok(StreamInitResponse { ctx_id: id.as_u64() }),
            Err(e @ SecuError::InitFailure { .. }) => {
                warn!(%kind, %algorithm, error = %e, "Init failed, returning no context");
                Ok(StreamInitResponse { ctx_id: 0 })
            }
            Err(e) => Err(into_status(e)),
        }
    }

    fn free(&self, kind: ContextKind, req: StreamFreeRequest) -> StreamFreeResponse {
        match ContextId::from_wire(req.ctx_id) {
            Some(id) => match kind {
                ContextKind::Integrity => self.broker.integrity_free(id),
                ContextKind::Ciphering => self.broker.ciphering_free(id),
            },
            None => debug!(%kind, "Free of context 0 ignored"),
        }
        StreamFreeResponse {}
    }
}

#[tonic::async_trait]
impl<E: CryptoEngine> SecuService for SecuGrpcService<E> {
    async fn stream_integrity_init(
        &self,
        request: Request<StreamInitRequest>,
    ) -> Result<Response<StreamInitResponse>, Status> {
        self.init(ContextKind::Integrity, request.into_inner())
            .map(Response::new)
    }

    async fn stream_integrity_free(
        &self,
        request: Request<StreamFreeRequest>,
    ) -> Result<Response<StreamFreeResponse>, Status> {
        Ok(Response::new(
            self.free(ContextKind::Integrity, request.into_inner()),
        ))
    }

    async fn stream_ciphering_init(
        &self,
        request: Request<StreamInitRequest>,
    ) -> Result<Response<StreamInitResponse>, Status> {
        self.init(ContextKind::Ciphering, request.into_inner())
            .map(Response::new)
    }

    async fn stream_ciphering_free(
        &self,
        request: Request<StreamFreeRequest>,
    ) -> Result<Response<StreamFreeResponse>, Status> {
        Ok(Response::new(
            self.free(ContextKind::Ciphering, request.into_inner()),
        ))
    }

    async fn stream_compute_integrity(
        &self,
        request: Request<IntegrityRequest>,
    ) -> Result<Response<IntegrityResponse>, Status> {
        let req = request.into_inner();
        let params = stream_params(ContextKind::Integrity, req.sc).map_err(into_status)?;
        let mac = self
            .broker
            .compute_integrity(AlgorithmId(req.algorithm), &params)
            .map_err(into_status)?;
        Ok(Response::new(IntegrityResponse { mac: mac.to_vec() }))
    }

    async fn stream_compute_encrypt(
        &self,
        request: Request<EncryptRequest>,
    ) -> Result<Response<EncryptResponse>, Status> {
        let req = request.into_inner();
        let params = stream_params(ContextKind::Ciphering, req.sc).map_err(into_status)?;
        let data = self
            .broker
            .compute_encrypt(AlgorithmId(req.algorithm), &params)
            .map_err(into_status)?;
        Ok(Response::new(EncryptResponse { data }))
    }
}
