//! HTTP routes for the blob API
//!
//! Blob operations live under `/api`:
//! - GET /api/providers - registered providers (JSON)
//! - GET /api/{provider}/{container} - list blobs
//! - POST /api/{provider}/{container} - create container if absent
//! - HEAD /api/{provider}/{container} - container exists
//! - DELETE /api/{provider}/{container} - delete container
//! - GET /api/{provider}/{container}/{blob} - download blob
//! - POST /api/{provider}/{container}/{blob} - upload blob
//! - HEAD /api/{provider}/{container}/{blob} - blob size
//! - DELETE /api/{provider}/{container}/{blob} - delete blob
//!
//! Every blob route expects `Authorization: Basic` with the storage
//! account name and key.
//!
//! Requests are bounded by `request_timeout`, except uploads: their body is
//! streamed for as long as it keeps arriving, and only a pause longer than
//! `request_timeout` fails it. Downloads are bounded until the response
//! headers are ready; the body then streams without a deadline.

mod handlers;
mod response;

use axum::{middleware, routing::get, Router};
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;

use crate::gateway::Gateway;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub gateway: Gateway,
    /// Largest accepted upload in bytes
    pub max_body_size: u64,
    /// Deadline for bounded requests; idle limit for upload bodies
    pub request_timeout: Duration,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let timeout = TimeoutLayer::new(state.request_timeout);

    let api = Router::new()
        .route("/providers", get(handlers::list_providers))
        .route(
            "/:provider/:container",
            get(handlers::list_blobs)
                .post(handlers::create_container)
                .head(handlers::container_exists)
                .delete(handlers::delete_container)
                .layer(timeout.clone()),
        )
        .route(
            "/:provider/:container/*blob",
            get(handlers::download_blob)
                .head(handlers::blob_size)
                .delete(handlers::delete_blob)
                .layer(timeout.clone())
                // Added after the layer so the deadline does not apply
                .post(handlers::upload_blob),
        );

    Router::new()
        .route("/healthz", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/metrics", get(handlers::metrics).layer(timeout))
        .nest("/api", api)
        .layer(middleware::from_fn(handlers::track_metrics))
        .with_state(state)
}
