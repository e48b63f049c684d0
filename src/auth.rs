//! HTTP Basic credential extraction
//!
//! The gateway keeps no identity store: the Basic username and password are
//! the storage account name and key, forwarded to the backend as-is.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;

use crate::errors::{GatewayError, Result};

const BASIC_SCHEME: &str = "Basic";

/// Storage account credentials for a single request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Both parts must be non-empty; use [`extract_credentials`] for
    /// untrusted input.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Parse the value of an `Authorization` header into credentials.
///
/// The scheme must be exactly `Basic` (case-sensitive), the token standard
/// base64, and the decoded text `username:password` with both sides
/// non-empty. Only the first `:` separates, so passwords may contain colons.
pub fn extract_credentials(header: Option<&str>) -> Result<Credentials> {
    let header = header.ok_or(GatewayError::MissingAuth)?;

    let (scheme, token) = header.split_once(' ').unwrap_or((header, ""));
    if scheme != BASIC_SCHEME {
        return Err(GatewayError::MalformedAuth(
            "authorization scheme must be Basic".to_string(),
        ));
    }

    let decoded = STANDARD
        .decode(token)
        .map_err(|e| GatewayError::MalformedAuth(format!("invalid base64 token: {}", e)))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| GatewayError::MalformedAuth("token is not valid UTF-8".to_string()))?;

    match decoded.split_once(':') {
        Some((username, password)) if !username.is_empty() && !password.is_empty() => {
            Ok(Credentials::new(username, password))
        }
        _ => Err(GatewayError::MalformedAuth(
            "expected non-empty username and password".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn basic(raw: &str) -> String {
        format!("Basic {}", STANDARD.encode(raw))
    }

    fn kind_of(header: Option<&str>) -> ErrorKind {
        extract_credentials(header).unwrap_err().kind()
    }

    #[test]
    fn test_valid_header() {
        let header = basic("user1:key1");
        let creds = extract_credentials(Some(&header)).unwrap();
        assert_eq!(creds.username(), "user1");
        assert_eq!(creds.password(), "key1");
    }

    #[test]
    fn test_password_may_contain_colon() {
        let header = basic("user1:a:b==");
        let creds = extract_credentials(Some(&header)).unwrap();
        assert_eq!(creds.username(), "user1");
        assert_eq!(creds.password(), "a:b==");
    }

    #[test]
    fn test_missing_header() {
        assert_eq!(kind_of(None), ErrorKind::MissingAuth);
    }

    #[test]
    fn test_wrong_scheme() {
        let token = STANDARD.encode("user1:key1");
        assert_eq!(
            kind_of(Some(&format!("Bearer {}", token))),
            ErrorKind::MalformedAuth
        );
        assert_eq!(
            kind_of(Some(&format!("basic {}", token))),
            ErrorKind::MalformedAuth
        );
        assert_eq!(kind_of(Some("")), ErrorKind::MalformedAuth);
    }

    #[test]
    fn test_bad_base64() {
        assert_eq!(kind_of(Some("Basic !!notbase64!!")), ErrorKind::MalformedAuth);
        assert_eq!(kind_of(Some("Basic")), ErrorKind::MalformedAuth);
    }

    #[test]
    fn test_incomplete_pairs() {
        for raw in ["user1", "user1:", ":key1", ":", ""] {
            assert_eq!(
                kind_of(Some(&basic(raw))),
                ErrorKind::MalformedAuth,
                "{:?} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_non_utf8_payload() {
        let header = format!("Basic {}", STANDARD.encode([0xff, 0xfe, b':', b'a']));
        assert_eq!(kind_of(Some(&header)), ErrorKind::MalformedAuth);
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("user1", "secret");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("user1"));
        assert!(!rendered.contains("secret"));
    }
}
