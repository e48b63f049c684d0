//! Backend failure to taxonomy mapping.
//!
//! Every backend call boundary funnels its native failure through one of
//! these functions. The precedence is fixed: invalid-input-shaped failures
//! first, then not-found-shaped ones, everything else is `BackendInternal`.
//! The native detail is logged here and only the kind plus a short message
//! travels further.

use reqwest::StatusCode;
use tracing::{error, warn};

use crate::errors::GatewayError;

/// Azure error codes that describe a bad name or parameter.
const INVALID_INPUT_CODES: &[&str] = &[
    "InvalidResourceName",
    "OutOfRangeInput",
    "InvalidUri",
    "InvalidQueryParameterValue",
];

fn is_invalid_input(status: StatusCode, code: Option<&str>) -> bool {
    status == StatusCode::BAD_REQUEST || code.is_some_and(|c| INVALID_INPUT_CODES.contains(&c))
}

fn is_not_found(status: StatusCode, code: Option<&str>) -> bool {
    status == StatusCode::NOT_FOUND || code.is_some_and(|c| c.ends_with("NotFound"))
}

/// Map an unsuccessful HTTP response from a remote service.
pub fn from_status(status: StatusCode, error_code: Option<&str>, context: &str) -> GatewayError {
    if is_invalid_input(status, error_code) {
        warn!(%status, error_code, context, "Backend rejected input");
        GatewayError::InvalidInput(context.to_string())
    } else if is_not_found(status, error_code) {
        warn!(%status, error_code, context, "Backend resource not found");
        GatewayError::NotFound(context.to_string())
    } else {
        error!(%status, error_code, context, "Backend request failed");
        GatewayError::BackendInternal(format!("{} (status {})", context, status.as_u16()))
    }
}

/// Map a transport-level failure (connect, TLS, timeout, body stream).
pub fn from_transport(err: reqwest::Error, context: &str) -> GatewayError {
    error!(
        error = %err,
        timeout = err.is_timeout(),
        connect = err.is_connect(),
        body = err.is_body(),
        context,
        "Backend transport failure"
    );
    GatewayError::BackendInternal(format!("{}: transport failure", context))
}

/// Map an `object_store` failure from the in-memory provider.
pub fn from_object_store(err: object_store::Error, context: &str) -> GatewayError {
    match err {
        object_store::Error::InvalidPath { source } => {
            warn!(error = %source, context, "Invalid object path");
            GatewayError::InvalidInput(context.to_string())
        }
        object_store::Error::NotFound { path, .. } => {
            warn!(path = %path, context, "Object not found");
            GatewayError::NotFound(context.to_string())
        }
        other => {
            error!(error = %other, context, "Object store failure");
            GatewayError::BackendInternal(context.to_string())
        }
    }
}

/// Map a failure reading or writing a content stream.
pub fn from_io(err: std::io::Error, context: &str) -> GatewayError {
    error!(error = %err, kind = ?err.kind(), context, "Content stream failure");
    GatewayError::BackendInternal(format!("{}: {}", context, err))
}

/// Failures that should never happen, such as an identifier built by the
/// gateway itself failing to parse.
pub fn internal(detail: impl std::fmt::Display, context: &str) -> GatewayError {
    error!(detail = %detail, context, "Unexpected internal failure");
    GatewayError::BackendInternal(context.to_string())
}
