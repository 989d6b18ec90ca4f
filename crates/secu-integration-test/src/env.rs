//! Loopback broker environment

use anyhow::{Context, Result};
use secu_broker::{server, ContextBroker, ContextsConfig, CryptoEngine};
use secu_client::{ClientConfig, ContextProxy, FailurePolicy, GrpcTransport, RetryPolicy};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::warn;

/// Broker served on `127.0.0.1:<ephemeral>` with epoch 0, so the first id
/// handed out is 1.
pub struct BrokerTestEnv<E: CryptoEngine> {
    broker: Arc<ContextBroker<E>>,
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    server: JoinHandle<Result<()>>,
}

impl<E: CryptoEngine> BrokerTestEnv<E> {
    pub async fn start(engine: E) -> Result<Self> {
        Self::start_with(
            engine,
            ContextsConfig {
                epoch: Some(0),
                max_contexts_per_kind: 1024,
            },
        )
        .await
    }

    pub async fn start_with(engine: E, contexts: ContextsConfig) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("binding loopback listener")?;
        let addr = listener.local_addr()?;
        let broker = Arc::new(ContextBroker::new(engine, &contexts));

        let (tx, rx) = oneshot::channel::<()>();
        let server = tokio::spawn(server::serve_with_listener(
            listener,
            Arc::clone(&broker),
            async move {
                let _ = rx.await;
            },
        ));

        Ok(Self {
            broker,
            addr,
            shutdown: Some(tx),
            server,
        })
    }

    pub fn broker(&self) -> &Arc<ContextBroker<E>> {
        &self.broker
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn client_config(&self, policy: FailurePolicy) -> ClientConfig {
        ClientConfig {
            failure_policy: policy,
            retry: RetryPolicy::none(),
            ..ClientConfig::with_endpoint(self.endpoint())
        }
    }

    pub fn proxy(&self, policy: FailurePolicy) -> ContextProxy<GrpcTransport> {
        ContextProxy::from_config(&self.client_config(policy))
    }

    /// Stops accepting and waits briefly for the server task.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match tokio::time::timeout(Duration::from_secs(5), self.server).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!("Broker server exited with error: {:#}", e),
            Ok(Err(e)) => warn!("Broker server task failed: {}", e),
            Err(_) => warn!("Broker server did not stop within 5s"),
        }
    }
}

/// Endpoint on a loopback port that nothing listens on.
pub async fn dead_endpoint() -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{}", addr))
}
