//! Shared Key request signing for the Azure Blob REST API.
//!
//! String-to-sign layout (API version 2015-02-21 and later):
//!
//! ```text
//! VERB\n
//! Content-Encoding\n
//! Content-Language\n
//! Content-Length\n        (empty when zero)
//! Content-MD5\n
//! Content-Type\n
//! Date\n
//! If-Modified-Since\n
//! If-Match\n
//! If-None-Match\n
//! If-Unmodified-Since\n
//! Range\n
//! CanonicalizedHeaders    (x-ms-* headers, sorted, one per line)
//! CanonicalizedResource   (/account/path, then sorted query parameters)
//! ```

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, Request};
use sha2::Sha256;
use std::collections::BTreeMap;
use url::Url;

use crate::errors::Result;
use crate::storage::error_map;

type HmacSha256 = Hmac<Sha256>;

/// Standard headers that take part in the signature, in order.
const SIGNED_HEADERS: &[&str] = &[
    "content-encoding",
    "content-language",
    "content-length",
    "content-md5",
    "content-type",
    "date",
    "if-modified-since",
    "if-match",
    "if-none-match",
    "if-unmodified-since",
    "range",
];

/// Signs requests with a storage account name and its decoded key.
pub(super) struct SharedKeySigner {
    account: String,
    key: Vec<u8>,
}

impl SharedKeySigner {
    pub(super) fn new(account: impl Into<String>, key: Vec<u8>) -> Self {
        Self {
            account: account.into(),
            key,
        }
    }

    pub(super) fn account(&self) -> &str {
        &self.account
    }

    /// Add the `Authorization: SharedKey` header. All other headers must
    /// already be in place.
    pub(super) fn sign(&self, request: &mut Request) -> Result<()> {
        let string_to_sign = self.string_to_sign(request.method(), request.headers(), request.url());

        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| error_map::internal(e, "initializing request signature"))?;
        mac.update(string_to_sign.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());

        let value = HeaderValue::from_str(&format!("SharedKey {}:{}", self.account, signature))
            .map_err(|e| error_map::internal(e, "building authorization header"))?;
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }

    fn string_to_sign(&self, method: &Method, headers: &HeaderMap, url: &Url) -> String {
        let mut out = String::from(method.as_str());
        out.push('\n');

        for name in SIGNED_HEADERS {
            let value = header_value(headers, name);
            // Zero content length is signed as an empty line
            if *name != "content-length" || value != "0" {
                out.push_str(value);
            }
            out.push('\n');
        }

        out.push_str(&canonicalized_headers(headers));
        out.push_str(&self.canonicalized_resource(url));
        out
    }

    fn canonicalized_resource(&self, url: &Url) -> String {
        let mut resource = format!("/{}{}", self.account, url.path());

        let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in url.query_pairs() {
            params
                .entry(name.to_lowercase())
                .or_default()
                .push(value.into_owned());
        }
        for (name, mut values) in params {
            values.sort();
            resource.push('\n');
            resource.push_str(&name);
            resource.push(':');
            resource.push_str(&values.join(","));
        }

        resource
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

fn canonicalized_headers(headers: &HeaderMap) -> String {
    let mut ms_headers: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.as_str();
        if name.starts_with("x-ms-") {
            if let Ok(value) = value.to_str() {
                ms_headers.entry(name).or_default().push(value.trim());
            }
        }
    }

    ms_headers
        .into_iter()
        .map(|(name, values)| format!("{}:{}\n", name, values.join(",")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATE: &str = "Sat, 30 May 2015 10:00:00 GMT";

    fn request(method: Method, url: &str) -> Request {
        let mut request = Request::new(method, Url::parse(url).unwrap());
        let headers = request.headers_mut();
        headers.insert("x-ms-date", HeaderValue::from_static(DATE));
        headers.insert("x-ms-version", HeaderValue::from_static("2021-08-06"));
        request
    }

    fn signer() -> SharedKeySigner {
        SharedKeySigner::new("user1", b"key1".to_vec())
    }

    #[test]
    fn test_string_to_sign_for_get() {
        let req = request(Method::GET, "https://user1.blob.core.windows.net/pics/a.jpg");
        let expected = format!(
            "GET{}x-ms-date:{}\nx-ms-version:2021-08-06\n/user1/pics/a.jpg",
            "\n".repeat(12),
            DATE
        );
        assert_eq!(
            signer().string_to_sign(req.method(), req.headers(), req.url()),
            expected
        );
    }

    #[test]
    fn test_string_to_sign_for_upload() {
        let mut req = request(Method::PUT, "https://user1.blob.core.windows.net/pics/a.jpg");
        let headers = req.headers_mut();
        headers.insert("content-length", HeaderValue::from_static("3"));
        headers.insert("content-type", HeaderValue::from_static("image/jpeg"));
        headers.insert("x-ms-blob-type", HeaderValue::from_static("BlockBlob"));

        let signed = signer().string_to_sign(req.method(), req.headers(), req.url());
        let lines: Vec<&str> = signed.split('\n').collect();
        assert_eq!(lines[0], "PUT");
        assert_eq!(lines[3], "3");
        assert_eq!(lines[5], "image/jpeg");
        assert_eq!(lines[12], "x-ms-blob-type:BlockBlob");
        assert_eq!(lines[13], format!("x-ms-date:{}", DATE));
        assert_eq!(lines.last().copied(), Some("/user1/pics/a.jpg"));
    }

    #[test]
    fn test_zero_content_length_is_blank() {
        let mut req = request(Method::PUT, "https://user1.blob.core.windows.net/pics?restype=container");
        req.headers_mut()
            .insert("content-length", HeaderValue::from_static("0"));
        let signed = signer().string_to_sign(req.method(), req.headers(), req.url());
        assert_eq!(signed.split('\n').nth(3), Some(""));
    }

    #[test]
    fn test_query_parameters_are_sorted() {
        let url = Url::parse(
            "http://127.0.0.1:10000/user1/pics?restype=container&comp=list&marker=abc",
        )
        .unwrap();
        assert_eq!(
            signer().canonicalized_resource(&url),
            "/user1/user1/pics\ncomp:list\nmarker:abc\nrestype:container"
        );
    }

    #[test]
    fn test_sign_sets_authorization() {
        let mut req = request(Method::GET, "https://user1.blob.core.windows.net/pics/a.jpg");
        signer().sign(&mut req).unwrap();
        let auth = req.headers().get(AUTHORIZATION).unwrap().to_str().unwrap();
        assert!(auth.starts_with("SharedKey user1:"));
        assert!(auth.len() > "SharedKey user1:".len());
    }
}
