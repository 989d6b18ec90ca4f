//! secu-brokerd - remote link-layer security context broker
//!
//! Loads configuration, builds the context broker around the reference NR
//! engine and serves it over gRPC until SIGINT.

use anyhow::{Context, Result};
use clap::Parser;
use secu_broker::audit::{self, AuditCategory, AuditOutcome, AuditRecord};
use secu_broker::{audit_log, server, BrokerConfig, ContextBroker, NrSecurityEngine};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Remote integrity and ciphering context broker
#[derive(Parser, Debug)]
#[command(name = "secu-brokerd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = secu_broker::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the configured listen address
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.json_logs {
        audit::init_logging_json(&args.log_level);
    } else {
        audit::init_logging(&args.log_level);
    }

    let mut config = BrokerConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }

    let broker = Arc::new(ContextBroker::new(NrSecurityEngine::new(), &config.contexts));

    info!(
        version = env!("CARGO_PKG_VERSION"),
        epoch = broker.epoch(),
        listen = %config.server.listen_addr,
        tls = config.tls_enabled(),
        max_contexts_per_kind = config.contexts.max_contexts_per_kind,
        "Starting secu-brokerd"
    );
    audit_log!(AuditRecord::new(AuditCategory::SystemLifecycle, "secu-brokerd", "start")
        .with_outcome(AuditOutcome::Success)
        .with_details(serde_json::json!({ "epoch": broker.epoch() })));

    let served = server::serve(&config.server, Arc::clone(&broker), shutdown_signal()).await;

    let stats = broker.stats();
    let released = broker.release_all();
    info!(?stats, released, "secu-brokerd stopped");
    audit_log!(AuditRecord::new(AuditCategory::SystemLifecycle, "secu-brokerd", "stop")
        .with_outcome(if served.is_ok() {
            AuditOutcome::Success
        } else {
            AuditOutcome::Failure
        })
        .with_details(serde_json::json!({ "stats": stats, "released": released })));

    served
}
