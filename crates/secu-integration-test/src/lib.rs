//! End-to-end test infrastructure for the remote security broker
//!
//! Provides:
//! - Deterministic stub engines with observable release counts
//! - A real broker served over loopback gRPC on an ephemeral port
//! - Client configs and proxies pointed at it, or at a dead port

pub mod engines;
mod env;

pub use engines::{StubEngine, STUB_DIGEST, UNSUPPORTED_ALGORITHM};
pub use env::{dead_endpoint, BrokerTestEnv};
