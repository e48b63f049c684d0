//! blobgate - REST gateway for cloud blob storage
//!
//! Exposes upload, download, delete and listing of blobs, plus container
//! lifecycle, over HTTP. Requests authenticate with HTTP Basic credentials
//! that are passed straight to the storage provider as the account name and
//! key; the gateway stores no identities of its own.

mod auth;
mod config;
mod errors;
mod gateway;
mod listing;
mod metrics;
mod routes;
mod server;
mod storage;

use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::server::Server;
use crate::storage::ProviderRegistry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration first so its log level can seed the filter
    let config = Config::from_env()?;

    // JSON output for structured logging; RUST_LOG wins over the config
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting blobgate");
    info!(?config, "Configuration loaded");

    // Initialize Prometheus metrics
    crate::metrics::init_metrics()?;

    let registry = Arc::new(ProviderRegistry::from_config(&config)?);
    info!(providers = ?registry.providers(), "Storage providers initialized");

    let server = Server::new(config, registry);

    // Handle graceful shutdown
    let shutdown_signal = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => {
                error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        }
    };

    if let Err(e) = server.start(shutdown_signal).await {
        error!(error = %e, "Server error");
        return Err(e);
    }

    info!("Server shutdown complete");
    Ok(())
}
