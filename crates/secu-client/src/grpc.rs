//! tonic implementation of [`SecuTransport`].

use crate::config::ClientConfig;
use crate::error::error_from_status;
use crate::transport::SecuTransport;
use async_trait::async_trait;
use secu_common::{
    AlgorithmId, ContextId, ContextKind, Key128, Result, SecuError, StreamCipherParams,
};
use secu_proto::{
    EncryptRequest, IntegrityRequest, SecuServiceClient, StreamCipher, StreamFreeRequest,
    StreamInitRequest,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::OnceCell;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};
use tracing::{debug, info, warn};

fn to_wire(params: StreamCipherParams) -> StreamCipher {
    StreamCipher {
        ctx_id: params.context.as_u64(),
        count: params.count,
        bearer: u32::from(params.bearer),
        direction: u32::from(params.direction.as_bit()),
        message: params.message,
        blength: params.bit_length,
    }
}

pub struct GrpcTransport {
    config: ClientConfig,
    client: OnceCell<SecuServiceClient<Channel>>,
    connect_attempts: AtomicUsize,
}

impl GrpcTransport {
    /// Nothing is dialed until the first call.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            client: OnceCell::new(),
            connect_attempts: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Number of times a channel has been dialed, successful or not.
    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.client.initialized()
    }

    async fn endpoint(&self) -> Result<Endpoint> {
        let mut endpoint = Endpoint::from_shared(self.config.endpoint.clone())
            .map_err(|e| SecuError::Config(format!("endpoint {}: {}", self.config.endpoint, e)))?
            .connect_timeout(self.config.connect_timeout())
            .timeout(self.config.request_timeout());

        if let Some(ca_path) = &self.config.tls_ca_path {
            let ca = tokio::fs::read(ca_path).await.map_err(|e| {
                SecuError::Config(format!("reading CA bundle {}: {}", ca_path.display(), e))
            })?;
            let mut tls = ClientTlsConfig::new().ca_certificate(Certificate::from_pem(ca));
            if let Some(domain) = &self.config.tls_domain {
                tls = tls.domain_name(domain.clone());
            }
            endpoint = endpoint
                .tls_config(tls)
                .map_err(|e| SecuError::Config(format!("TLS: {}", e)))?;
        }
        Ok(endpoint)
    }

    async fn dial(&self) -> Result<SecuServiceClient<Channel>> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let channel = self.endpoint().await?.connect().await.map_err(|e| {
            warn!(endpoint = %self.config.endpoint, error = %e, "Broker connection failed");
            SecuError::Transport {
                retryable: true,
                message: format!("connect {}: {}", self.config.endpoint, e),
            }
        })?;
        info!(
            endpoint = %self.config.endpoint,
            tls = self.config.tls_enabled(),
            "Connected to broker"
        );
        Ok(SecuServiceClient::new(channel))
    }

    /// Shared client, dialing on first use. A failed dial leaves the cell
    /// empty so the next caller dials again.
    async fn client(&self) -> Result<SecuServiceClient<Channel>> {
        self.client
            .get_or_try_init(|| self.dial())
            .await
            .cloned()
    }

    async fn init(&self, kind: ContextKind, algorithm: AlgorithmId, key: Key128) -> Result<u64> {
        let mut client = self.client().await?;
        let request = StreamInitRequest {
            algorithm: algorithm.0,
            key: key.to_vec(),
        };
        let response = match kind {
            ContextKind::Integrity => client.stream_integrity_init(request).await,
            ContextKind::Ciphering => client.stream_ciphering_init(request).await,
        }
        .map_err(|s| error_from_status(&s, kind, 0))?;
        Ok(response.into_inner().ctx_id)
    }

    async fn free(&self, kind: ContextKind, id: ContextId) -> Result<()> {
        let mut client = self.client().await?;
        let request = StreamFreeRequest { ctx_id: id.as_u64() };
        let response = match kind {
            ContextKind::Integrity => client.stream_integrity_free(request).await,
            ContextKind::Ciphering => client.stream_ciphering_free(request).await,
        };
        response.map_err(|s| error_from_status(&s, kind, id.as_u64()))?;
        debug!(%kind, %id, "Freed remote context");
        Ok(())
    }
}

#[async_trait]
impl SecuTransport for GrpcTransport {
    async fn connect(&self) -> Result<()> {
        self.client().await.map(|_| ())
    }

    async fn integrity_init(&self, algorithm: AlgorithmId, key: Key128) -> Result<u64> {
        self.init(ContextKind::Integrity, algorithm, key).await
    }

    async fn ciphering_init(&self, algorithm: AlgorithmId, key: Key128) -> Result<u64> {
        self.init(ContextKind::Ciphering, algorithm, key).await
    }

    async fn integrity_free(&self, id: ContextId) -> Result<()> {
        self.free(ContextKind::Integrity, id).await
    }

    async fn ciphering_free(&self, id: ContextId) -> Result<()> {
        self.free(ContextKind::Ciphering, id).await
    }

    async fn compute_integrity(
        &self,
        algorithm: AlgorithmId,
        params: StreamCipherParams,
    ) -> Result<Vec<u8>> {
        let mut client = self.client().await?;
        let id = params.context.as_u64();
        let response = client
            .stream_compute_integrity(IntegrityRequest {
                algorithm: algorithm.0,
                sc: Some(to_wire(params)),
            })
            .await
            .map_err(|s| error_from_status(&s, ContextKind::Integrity, id))?;
        Ok(response.into_inner().mac)
    }

    async fn compute_encrypt(
        &self,
        algorithm: AlgorithmId,
        params: StreamCipherParams,
    ) -> Result<Vec<u8>> {
        let mut client = self.client().await?;
        let id = params.context.as_u64();
        let response = client
            .stream_compute_encrypt(EncryptRequest {
                algorithm: algorithm.0,
                sc: Some(to_wire(params)),
            })
            .await
            .map_err(|s| error_from_status(&s, ContextKind::Ciphering, id))?;
        Ok(response.into_inner().data)
    }
}
