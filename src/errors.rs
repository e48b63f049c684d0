//! Error taxonomy for blobgate
//!
//! Every failure surfaced by the gateway core is one of a small, fixed set
//! of kinds. Backends never return their native errors to callers; the
//! error mapper in `storage::error_map` converts them at the call boundary.
//! Translating kinds into HTTP status codes is the router's job.

use thiserror::Error;

/// Fieldless projection of [`GatewayError`], used for metrics labels and
/// status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MissingAuth,
    MalformedAuth,
    UnsupportedProvider,
    InvalidInput,
    NotFound,
    BackendInternal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MissingAuth => "MissingAuth",
            ErrorKind::MalformedAuth => "MalformedAuth",
            ErrorKind::UnsupportedProvider => "UnsupportedProvider",
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::BackendInternal => "BackendInternal",
        }
    }
}

/// Main error type for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// No credential token supplied
    #[error("Missing authorization header")]
    MissingAuth,

    /// Token present but unparsable or incomplete
    #[error("Malformed authorization header: {0}")]
    MalformedAuth(String),

    /// Requested backend name is not registered
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// A name or parameter failed backend syntax rules
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The addressed container or blob does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other backend failure
    #[error("Backend error: {0}")]
    BackendInternal(String),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::MissingAuth => ErrorKind::MissingAuth,
            GatewayError::MalformedAuth(_) => ErrorKind::MalformedAuth,
            GatewayError::UnsupportedProvider(_) => ErrorKind::UnsupportedProvider,
            GatewayError::InvalidInput(_) => ErrorKind::InvalidInput,
            GatewayError::NotFound(_) => ErrorKind::NotFound,
            GatewayError::BackendInternal(_) => ErrorKind::BackendInternal,
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_projection() {
        assert_eq!(GatewayError::MissingAuth.kind(), ErrorKind::MissingAuth);
        assert_eq!(
            GatewayError::NotFound("pics".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            GatewayError::BackendInternal("boom".into()).kind().as_str(),
            "BackendInternal"
        );
    }
}
