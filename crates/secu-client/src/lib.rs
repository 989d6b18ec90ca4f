//! Client side of the remote link-layer security offload.
//!
//! The security sublayer holds typed handles to contexts that live in the
//! broker and forwards every per-frame compute across a [`SecuTransport`].
//!
//! ```text
//! NrIntegrity / NrCiphering     bytes, 1-based bearer, blocking
//!         │
//! BlockingSecurity              owns a tokio runtime
//!         │
//! ContextProxy<T>               handles, failure policy, retry
//!         │
//! SecuTransport (GrpcTransport) one lazily dialed channel
//! ```
//!
//! ```ignore
//! let config = ClientConfig::load_or_default(DEFAULT_CLIENT_CONFIG_PATH)?;
//! let security = Arc::new(BlockingSecurity::from_config(&config)?);
//! let nia = NrIntegrity::nia2(Arc::clone(&security));
//! let ctx = nia.init(&key).ok_or("no context")?;
//! nia.integrity(&ctx, &mut mac, &pdu, pdu.len(), bearer, count, direction)?;
//! nia.free(ctx);
//! ```

pub mod adapter;
pub mod config;
pub mod error;
pub mod grpc;
pub mod proxy;
pub mod transport;

pub use adapter::{BlockingSecurity, NrCiphering, NrIntegrity, SecurityContainer};
pub use config::{ClientConfig, FailurePolicy, RetryPolicy, DEFAULT_CLIENT_CONFIG_PATH};
pub use grpc::GrpcTransport;
pub use proxy::{CipheringContext, ContextProxy, IntegrityContext};
pub use transport::SecuTransport;
