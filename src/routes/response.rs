//! Error kinds to HTTP responses.

use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use crate::errors::{ErrorKind, GatewayError};

/// HTTP status for each error kind
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::MissingAuth => StatusCode::FORBIDDEN,
        ErrorKind::MalformedAuth => StatusCode::BAD_REQUEST,
        ErrorKind::UnsupportedProvider => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::BackendInternal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Error response body
#[derive(Debug, Serialize)]
#[serde(rename = "Error", rename_all = "PascalCase")]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);
        let message = self.to_string();

        let body = ErrorBody {
            code: kind.as_str(),
            message: &message,
        };
        match quick_xml::se::to_string(&body) {
            Ok(xml) => (status, [(CONTENT_TYPE, "application/xml")], xml).into_response(),
            Err(e) => {
                error!(error = %e, "Failed to encode error body");
                status.into_response()
            }
        }
    }
}
