//! HTTP server implementation
//!
//! Sets up the Axum HTTP server with:
//! - Blob API routes
//! - Middleware (tracing, metrics, per-route timeouts)
//! - Graceful shutdown
//! - Health/readiness probes

use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::gateway::Gateway;
use crate::routes::{self, AppState};
use crate::storage::ProviderRegistry;

/// HTTP server for blobgate
pub struct Server {
    config: Config,
    gateway: Gateway,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            config,
            gateway: Gateway::new(registry),
        }
    }

    /// Build the Axum router with all middleware
    fn build_router(&self) -> Router {
        let state = AppState {
            gateway: self.gateway.clone(),
            max_body_size: self.config.server.max_body_size,
            request_timeout: Duration::from_secs(self.config.server.timeout_secs),
        };

        routes::create_router(state).layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        )
    }

    /// Start the server and run until shutdown signal
    pub async fn start<F>(&self, shutdown: F) -> Result<(), Box<dyn std::error::Error>>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = self.build_router();

        let listener = tokio::net::TcpListener::bind(self.config.server.bind_address).await?;
        info!(
            address = %self.config.server.bind_address,
            providers = ?self.gateway.providers(),
            "Server listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
