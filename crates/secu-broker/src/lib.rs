//! Remote crypto-context broker.
//!
//! Holds integrity and ciphering contexts on behalf of PDCP clients and runs
//! per-frame MAC and ciphering computes against a pluggable
//! [`CryptoEngine`](engine::CryptoEngine). Clients refer to contexts only by
//! opaque, epoch-tagged [`ContextId`](secu_common::ContextId)s.
//!
//! # Layout
//!
//! - [`allocator`]: one monotonic id counter shared by both tables
//! - [`table`]: lock-scoped `ContextTable<C>`, instantiated per kind
//! - [`broker`]: lifecycle, validation, dispatch to the engine
//! - [`engine`]: engine trait and the NIA/NEA reference engine
//! - [`service`] / [`server`]: gRPC surface and bootstrap
//! - [`config`] / [`audit`]: TOML configuration, audit records, logging setup

pub mod allocator;
pub mod audit;
pub mod broker;
pub mod config;
pub mod engine;
pub mod server;
pub mod service;
pub mod table;

pub use broker::{BrokerStats, ContextBroker};
pub use config::{BrokerConfig, ContextsConfig, ServerConfig, DEFAULT_CONFIG_PATH};
pub use engine::{CryptoEngine, EngineError, EngineResult, NrContext, NrSecurityEngine};
pub use service::SecuGrpcService;
