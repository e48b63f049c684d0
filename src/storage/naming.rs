//! Azure Blob Storage naming rules.
//!
//! The in-memory provider applies the same rules so that it rejects exactly
//! what the real service would.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::errors::{GatewayError, Result};

const MAX_BLOB_NAME_LEN: usize = 1024;
const MAX_BLOB_PATH_SEGMENTS: usize = 254;

/// Storage account names: 3-24 characters, lowercase letters and digits.
pub fn validate_account_name(name: &str) -> Result<()> {
    let valid = (3..=24).contains(&name.len())
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(GatewayError::InvalidInput(format!(
            "invalid storage account name: {}",
            name
        )))
    }
}

/// Account keys are standard base64; returns the decoded key bytes.
pub fn decode_account_key(key: &str) -> Result<Vec<u8>> {
    match STANDARD.decode(key) {
        Ok(bytes) if !bytes.is_empty() => Ok(bytes),
        _ => Err(GatewayError::InvalidInput(
            "storage account key is not valid base64".to_string(),
        )),
    }
}

/// Container names: 3-63 characters of lowercase letters, digits and
/// hyphens, starting and ending with a letter or digit, without consecutive
/// hyphens.
pub fn validate_container_name(name: &str) -> Result<()> {
    let bytes = name.as_bytes();
    let alnum = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();

    let valid = (3..=63).contains(&bytes.len())
        && bytes.iter().all(|b| alnum(b) || *b == b'-')
        && bytes.first().is_some_and(alnum)
        && bytes.last().is_some_and(alnum)
        && !name.contains("--");

    if valid {
        Ok(())
    } else {
        Err(GatewayError::InvalidInput(format!(
            "invalid container name: {}",
            name
        )))
    }
}

/// Blob names: 1-1024 characters, at most 254 path segments, no control
/// characters. A leading or trailing `/` would alias another name once the
/// path is normalised, so both are rejected.
pub fn validate_blob_name(name: &str) -> Result<()> {
    let chars = name.chars().count();
    let valid = (1..=MAX_BLOB_NAME_LEN).contains(&chars)
        && name.split('/').count() <= MAX_BLOB_PATH_SEGMENTS
        && !name.starts_with('/')
        && !name.ends_with('/')
        && !name.chars().any(char::is_control);

    if valid {
        Ok(())
    } else {
        Err(GatewayError::InvalidInput(format!("invalid blob name: {}", name)))
    }
}
