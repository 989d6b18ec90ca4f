//! gRPC server bootstrap.
//!
//! Serves `secu.v1.SecuService` next to the standard `grpc.health.v1`
//! service, optionally over TLS.

use crate::broker::ContextBroker;
use crate::config::ServerConfig;
use crate::engine::CryptoEngine;
use crate::service::SecuGrpcService;
use anyhow::{Context, Result};
use secu_proto::SecuServiceServer;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::server::Router;
use tonic::transport::{Identity, Server, ServerTlsConfig};
use tracing::info;

async fn load_identity(config: &ServerConfig) -> Result<Option<Identity>> {
    let (Some(cert_path), Some(key_path)) = (&config.tls_cert_path, &config.tls_key_path) else {
        return Ok(None);
    };
    let cert = tokio::fs::read(cert_path)
        .await
        .with_context(|| format!("reading TLS certificate {}", cert_path.display()))?;
    let key = tokio::fs::read(key_path)
        .await
        .with_context(|| format!("reading TLS key {}", key_path.display()))?;
    Ok(Some(Identity::from_pem(cert, key)))
}

async fn router<E: CryptoEngine>(
    broker: Arc<ContextBroker<E>>,
    identity: Option<Identity>,
) -> Result<Router> {
    let (mut reporter, health_service) = tonic_health::server::health_reporter();
    reporter
        .set_serving::<SecuServiceServer<SecuGrpcService<E>>>()
        .await;

    let mut builder = Server::builder();
    if let Some(identity) = identity {
        builder = builder
            .tls_config(ServerTlsConfig::new().identity(identity))
            .context("configuring TLS")?;
    }

    Ok(builder
        .add_service(health_service)
        .add_service(SecuServiceServer::new(SecuGrpcService::new(broker))))
}

/// Binds `config.listen_addr` and serves until `shutdown` resolves.
pub async fn serve<E, F>(config: &ServerConfig, broker: Arc<ContextBroker<E>>, shutdown: F) -> Result<()>
where
    E: CryptoEngine,
    F: Future<Output = ()> + Send,
{
    let identity = load_identity(config).await?;
    let tls = identity.is_some();
    let router = router(broker, identity).await?;

    info!(addr = %config.listen_addr, tls, "Serving secu.v1.SecuService");
    router
        .serve_with_shutdown(config.listen_addr, shutdown)
        .await
        .with_context(|| format!("gRPC server on {}", config.listen_addr))
}

/// Serves plaintext gRPC on an already-bound listener, e.g. an ephemeral
/// loopback port.
pub async fn serve_with_listener<E, F>(
    listener: TcpListener,
    broker: Arc<ContextBroker<E>>,
    shutdown: F,
) -> Result<()>
where
    E: CryptoEngine,
    F: Future<Output = ()> + Send,
{
    let addr = listener.local_addr().context("listener address")?;
    let router = router(broker, None).await?;

    info!(%addr, "Serving secu.v1.SecuService");
    router
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await
        .context("gRPC server")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_plaintext_config_has_no_identity() {
        let config = ServerConfig::default();
        assert!(load_identity(&config).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_tls_files_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            tls_cert_path: Some(dir.path().join("absent.pem")),
            tls_key_path: Some(PathBuf::from("/nonexistent/absent.key")),
            ..ServerConfig::default()
        };
        let err = load_identity(&config).await.unwrap_err();
        assert!(err.to_string().contains("absent.pem"));
    }
}
