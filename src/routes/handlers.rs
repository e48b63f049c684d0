//! Request handlers for the blob API

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, Path, Request, State},
    http::{
        header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE},
        request::Parts,
        HeaderMap, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use futures::{StreamExt, TryStreamExt};
use std::io;
use std::time::Instant;
use tracing::{error, info, instrument};

use crate::auth::{extract_credentials, Credentials};
use crate::errors::{GatewayError, Result};
use crate::metrics::{self, HTTP_REQUESTS, HTTP_REQUEST_DURATION};
use crate::routes::AppState;
use crate::storage::stream::idle_timeout;

/// Header carrying a blob's size on `HEAD` requests
pub const BLOB_SIZE_HEADER: &str = "x-blob-size";

/// Credentials taken from the `Authorization` header.
pub struct BasicAuth(pub Credentials);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for BasicAuth {
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .map(|value| {
                value.to_str().map_err(|_| {
                    GatewayError::MalformedAuth("header is not visible ASCII".to_string())
                })
            })
            .transpose()?;
        extract_credentials(header).map(BasicAuth)
    }
}

fn empty(status: StatusCode) -> Result<Response> {
    Response::builder()
        .status(status)
        .body(Body::empty())
        .map_err(|e| GatewayError::BackendInternal(format!("Failed to build response: {}", e)))
}

/// Declared upload length, bounded by the configured maximum.
fn declared_length(headers: &HeaderMap, max_body_size: u64) -> Result<u64> {
    let length: u64 = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| GatewayError::InvalidInput("Content-Length header is required".to_string()))?;

    if length > max_body_size {
        return Err(GatewayError::InvalidInput(format!(
            "blob of {} bytes exceeds the {} byte limit",
            length, max_body_size
        )));
    }
    Ok(length)
}

/// Records request count and latency for every request.
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let started = Instant::now();

    let response = next.run(request).await;

    HTTP_REQUESTS
        .with_label_values(&[method.as_str(), response.status().as_str()])
        .inc();
    HTTP_REQUEST_DURATION.observe(started.elapsed().as_secs_f64());
    response
}

/// Health check endpoint
#[instrument]
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness probe: ready once at least one provider is registered
#[instrument(skip(state))]
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    if state.gateway.is_ready() {
        (StatusCode::OK, "Ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "No storage providers registered")
    }
}

/// Prometheus metrics endpoint
#[instrument]
pub async fn metrics() -> Response {
    match metrics::render() {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET /api/providers
#[instrument(skip(state))]
pub async fn list_providers(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.gateway.providers())
}

/// GET /api/{provider}/{container} - listing document
#[instrument(skip(state, auth))]
pub async fn list_blobs(
    State(state): State<AppState>,
    Path((provider, container)): Path<(String, String)>,
    BasicAuth(auth): BasicAuth,
) -> Result<Response> {
    info!(provider = %provider, container = %container, "ListBlobs request");

    let document = state
        .gateway
        .list_blobs(&provider, &container, &auth)
        .await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/xml")
        .header(CONTENT_LENGTH, document.len())
        .body(Body::from(document))
        .map_err(|e| GatewayError::BackendInternal(format!("Failed to build response: {}", e)))
}

/// POST /api/{provider}/{container} - create unless present
#[instrument(skip(state, auth))]
pub async fn create_container(
    State(state): State<AppState>,
    Path((provider, container)): Path<(String, String)>,
    BasicAuth(auth): BasicAuth,
) -> Result<Response> {
    info!(provider = %provider, container = %container, "CreateContainer request");

    state
        .gateway
        .create_container_if_absent(&provider, &container, &auth)
        .await?;
    empty(StatusCode::OK)
}

/// HEAD /api/{provider}/{container} - 200 when present, 404 otherwise
#[instrument(skip(state, auth))]
pub async fn container_exists(
    State(state): State<AppState>,
    Path((provider, container)): Path<(String, String)>,
    BasicAuth(auth): BasicAuth,
) -> Result<Response> {
    let exists = state
        .gateway
        .container_exists(&provider, &container, &auth)
        .await?;
    info!(provider = %provider, container = %container, exists, "ContainerExists request");

    empty(if exists {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    })
}

/// DELETE /api/{provider}/{container}
#[instrument(skip(state, auth))]
pub async fn delete_container(
    State(state): State<AppState>,
    Path((provider, container)): Path<(String, String)>,
    BasicAuth(auth): BasicAuth,
) -> Result<Response> {
    info!(provider = %provider, container = %container, "DeleteContainer request");

    state
        .gateway
        .delete_container(&provider, &container, &auth)
        .await?;
    empty(StatusCode::OK)
}

/// GET /api/{provider}/{container}/{blob} - streamed download
#[instrument(skip(state, auth))]
pub async fn download_blob(
    State(state): State<AppState>,
    Path((provider, container, blob)): Path<(String, String, String)>,
    BasicAuth(auth): BasicAuth,
) -> Result<Response> {
    info!(provider = %provider, container = %container, blob = %blob, "DownloadBlob request");

    let download = state
        .gateway
        .download_blob(&provider, &container, &blob, &auth)
        .await?;

    let content_type = download.content_type.unwrap_or_else(|| {
        mime_guess::from_path(&blob)
            .first_or_octet_stream()
            .to_string()
    });

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type);
    if let Some(length) = download.content_length {
        builder = builder.header(CONTENT_LENGTH, length);
    }

    builder
        .body(Body::from_stream(download.body))
        .map_err(|e| GatewayError::BackendInternal(format!("Failed to build response: {}", e)))
}

/// POST /api/{provider}/{container}/{blob} - streamed upload
///
/// The body is forwarded as it arrives; `Content-Length` is required. There
/// is no overall deadline, only a limit on how long the body may stall.
#[instrument(skip(state, auth, headers, body))]
pub async fn upload_blob(
    State(state): State<AppState>,
    Path((provider, container, blob)): Path<(String, String, String)>,
    BasicAuth(auth): BasicAuth,
    headers: HeaderMap,
    body: Body,
) -> Result<Response> {
    let length = declared_length(&headers, state.max_body_size)?;
    info!(provider = %provider, container = %container, blob = %blob, size = length, "UploadBlob request");

    let content = body
        .into_data_stream()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
        .boxed();
    let content = idle_timeout(content, state.request_timeout);

    state
        .gateway
        .upload_blob(&provider, &container, &blob, &auth, content, length)
        .await?;
    empty(StatusCode::OK)
}

/// HEAD /api/{provider}/{container}/{blob} - size in `x-blob-size`
#[instrument(skip(state, auth))]
pub async fn blob_size(
    State(state): State<AppState>,
    Path((provider, container, blob)): Path<(String, String, String)>,
    BasicAuth(auth): BasicAuth,
) -> Result<Response> {
    info!(provider = %provider, container = %container, blob = %blob, "BlobSize request");

    let size = state
        .gateway
        .blob_size(&provider, &container, &blob, &auth)
        .await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(BLOB_SIZE_HEADER, size)
        .body(Body::empty())
        .map_err(|e| GatewayError::BackendInternal(format!("Failed to build response: {}", e)))
}

/// DELETE /api/{provider}/{container}/{blob}
#[instrument(skip(state, auth))]
pub async fn delete_blob(
    State(state): State<AppState>,
    Path((provider, container, blob)): Path<(String, String, String)>,
    BasicAuth(auth): BasicAuth,
) -> Result<Response> {
    info!(provider = %provider, container = %container, blob = %blob, "DeleteBlob request");

    state
        .gateway
        .delete_blob(&provider, &container, &blob, &auth)
        .await?;
    empty(StatusCode::OK)
}
