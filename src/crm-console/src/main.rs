//! CRM Console: customer segmentation and segment messaging service.
//!
//! Main entry point that wires the store, engines and HTTP API.

use clap::Parser;
use crm_api::{ApiServer, AppState};
use crm_channels::EmailTransport;
use crm_core::config::AppConfig;
use crm_core::event_bus::TracingSink;
use crm_store::MemoryStore;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "crm-console")]
#[command(about = "Customer segmentation and segment messaging for the operator console")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "CRM_CONSOLE__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "CRM_CONSOLE__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Prometheus exporter port (overrides config)
    #[arg(long, env = "CRM_CONSOLE__METRICS__PORT")]
    metrics_port: Option<u16>,

    /// Start with an empty store instead of the demo dataset
    #[arg(long, default_value_t = false)]
    no_seed: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crm_console=info,crm_api=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("CRM Console starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(port) = cli.metrics_port {
        config.metrics.port = port;
    }
    if cli.no_seed {
        config.store.seed_demo_data = false;
    }
    config.validate()?;

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        metrics_port = config.metrics.port,
        email_domain = %config.segmentation.allowed_email_domain,
        "Configuration loaded"
    );

    // Backing store
    let store = Arc::new(if config.store.seed_demo_data {
        MemoryStore::seeded()
    } else {
        MemoryStore::new()
    });

    let transport = Arc::new(EmailTransport::new(&config.dispatch));
    let state = AppState::new(&config, store, transport, Arc::new(TracingSink));
    let api_server = ApiServer::new(config.clone(), state);

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("CRM Console is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}
