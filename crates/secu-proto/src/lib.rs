//! gRPC wire definitions for the remote security service.
//!
//! Field mapping is exact: `ctx_id` is the raw context id (0 is the
//! "no context" sentinel), `bearer` is 0-based, `blength` is a bit length
//! independent of the length of `message`.

#[allow(clippy::all)]
pub mod v1 {
    tonic::include_proto!("secu.v1");
}

pub use v1::secu_service_client::SecuServiceClient;
pub use v1::secu_service_server::{SecuService, SecuServiceServer};
pub use v1::{
    EncryptRequest, EncryptResponse, IntegrityRequest, IntegrityResponse, StreamCipher,
    StreamFreeRequest, StreamFreeResponse, StreamInitRequest, StreamInitResponse,
};
