//! Azure Blob Storage backend
//!
//! Talks to the Blob service REST API directly with `reqwest`. Each request
//! is signed with the caller's account name and key (Shared Key), so the
//! gateway holds no Azure credentials of its own.
//!
//! The endpoint is a template in which `{account}` is replaced by the
//! account name:
//! - `https://{account}.blob.core.windows.net` (default)
//! - `http://127.0.0.1:10000/{account}` (Azurite, path-style)

mod signer;
mod xml;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Method, Response, StatusCode};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use self::signer::SharedKeySigner;
use crate::auth::Credentials;
use crate::config::AzureConfig;
use crate::errors::{GatewayError, Result};
use crate::storage::{
    error_map, naming, BackendSession, BlobDownload, BlobListing, BlobMetadata, ByteStream,
    ContainerHandle, StorageBackend,
};

const ACCOUNT_PLACEHOLDER: &str = "{account}";
const ERROR_CODE_HEADER: &str = "x-ms-error-code";
const CONTAINER_BEING_DELETED: &str = "ContainerBeingDeleted";

/// Azure Blob Storage backend
pub struct AzureBlobBackend {
    client: reqwest::Client,
    endpoint: String,
    api_version: String,
}

impl AzureBlobBackend {
    /// Create the backend. No network I/O happens until a request arrives.
    pub fn new(config: &AzureConfig) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        if !config.endpoint.contains(ACCOUNT_PLACEHOLDER) {
            return Err(format!(
                "Azure endpoint '{}' must contain {}",
                config.endpoint, ACCOUNT_PLACEHOLDER
            )
            .into());
        }
        // Catch malformed templates at startup rather than per request
        Url::parse(&config.endpoint.replace(ACCOUNT_PLACEHOLDER, "account"))?;

        // Idle limits only; a transfer that keeps making progress is never cut off
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        info!(endpoint = %config.endpoint, api_version = %config.api_version, "Azure Blob backend ready");

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_version: config.api_version.clone(),
        })
    }
}

#[async_trait]
impl StorageBackend for AzureBlobBackend {
    fn name(&self) -> &'static str {
        "azureblob"
    }

    async fn connect(&self, credentials: &Credentials) -> Result<Box<dyn BackendSession>> {
        naming::validate_account_name(credentials.username())?;
        let key = naming::decode_account_key(credentials.password())?;

        let endpoint = self
            .endpoint
            .replace(ACCOUNT_PLACEHOLDER, credentials.username());
        let base_url = Url::parse(&endpoint)
            .map_err(|e| error_map::internal(e, "building account endpoint"))?;

        debug!(account = %credentials.username(), endpoint = %base_url, "Azure session opened");

        Ok(Box::new(AzureSession {
            account: Arc::new(AzureAccount {
                client: self.client.clone(),
                base_url,
                api_version: self.api_version.clone(),
                signer: SharedKeySigner::new(credentials.username(), key),
            }),
        }))
    }
}

/// Everything needed to issue signed requests against one storage account.
struct AzureAccount {
    client: reqwest::Client,
    base_url: Url,
    api_version: String,
    signer: SharedKeySigner,
}

impl AzureAccount {
    fn url(&self, container: &str, blob: Option<&str>, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| error_map::internal(&self.base_url, "endpoint cannot carry a path"))?;
            segments.pop_if_empty().push(container);
            if let Some(blob) = blob {
                segments.extend(blob.split('/'));
            }
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn container_url(&self, container: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut params = vec![("restype", "container")];
        params.extend_from_slice(query);
        self.url(container, None, &params)
    }

    /// Sign and send one request. Non-success statuses are returned as-is.
    async fn send(
        &self,
        method: Method,
        url: Url,
        headers: HeaderMap,
        body: Option<reqwest::Body>,
        context: &str,
    ) -> Result<Response> {
        let mut request = reqwest::Request::new(method, url);
        let date = chrono::Utc::now()
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();

        let request_headers = request.headers_mut();
        request_headers.extend(headers);
        request_headers.insert("x-ms-date", header_value(&date)?);
        request_headers.insert("x-ms-version", header_value(&self.api_version)?);
        request_headers.insert(
            "x-ms-client-request-id",
            header_value(&uuid::Uuid::new_v4().to_string())?,
        );
        *request.body_mut() = body;

        self.signer.sign(&mut request)?;

        debug!(
            account = %self.signer.account(),
            method = %request.method(),
            url = %request.url(),
            "Azure request"
        );

        self.client
            .execute(request)
            .await
            .map_err(|e| error_map::from_transport(e, context))
    }

    /// Send a request and map any non-success status.
    async fn call(
        &self,
        method: Method,
        url: Url,
        headers: HeaderMap,
        body: Option<reqwest::Body>,
        context: &str,
    ) -> Result<Response> {
        let response = self.send(method, url, headers, body, context).await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(failure(&response, context))
        }
    }

    async fn container_exists(&self, container: &str) -> Result<bool> {
        let context = format!("container {}", container);
        let url = self.container_url(container, &[])?;
        let response = self
            .send(Method::GET, url, HeaderMap::new(), None, &context)
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(failure(&response, &context)),
        }
    }

    async fn list_page(&self, container: &str, marker: Option<&str>) -> Result<xml::BlobPage> {
        let context = format!("listing container {}", container);
        let mut query = vec![("comp", "list")];
        if let Some(marker) = marker {
            query.push(("marker", marker));
        }
        let url = self.container_url(container, &query)?;

        let body = self
            .call(Method::GET, url, HeaderMap::new(), None, &context)
            .await?
            .text()
            .await
            .map_err(|e| error_map::from_transport(e, &context))?;

        xml::parse_blob_page(&body).map_err(|e| error_map::internal(e, &context))
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| error_map::internal(e, "building request header"))
}

fn error_code(response: &Response) -> Option<&str> {
    response
        .headers()
        .get(ERROR_CODE_HEADER)
        .and_then(|v| v.to_str().ok())
}

fn failure(response: &Response, context: &str) -> GatewayError {
    error_map::from_status(response.status(), error_code(response), context)
}

struct AzureSession {
    account: Arc<AzureAccount>,
}

#[async_trait]
impl BackendSession for AzureSession {
    async fn resolve_container(
        &self,
        name: &str,
        must_exist: bool,
    ) -> Result<Box<dyn ContainerHandle>> {
        naming::validate_container_name(name)?;

        if must_exist && !self.account.container_exists(name).await? {
            return Err(GatewayError::NotFound(format!("container {}", name)));
        }

        Ok(Box::new(AzureContainer {
            account: Arc::clone(&self.account),
            name: name.to_string(),
        }))
    }

    async fn create_container_if_absent(&self, name: &str) -> Result<()> {
        naming::validate_container_name(name)?;
        let context = format!("creating container {}", name);
        let url = self.account.container_url(name, &[])?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));

        let response = self
            .account
            .send(Method::PUT, url, headers, None, &context)
            .await?;

        match response.status() {
            status if status.is_success() => {
                info!(container = %name, "Container created");
                Ok(())
            }
            StatusCode::CONFLICT if error_code(&response) != Some(CONTAINER_BEING_DELETED) => {
                debug!(container = %name, "Container already exists");
                Ok(())
            }
            _ => Err(failure(&response, &context)),
        }
    }

    async fn container_exists(&self, name: &str) -> Result<bool> {
        naming::validate_container_name(name)?;
        self.account.container_exists(name).await
    }
}

struct AzureContainer {
    account: Arc<AzureAccount>,
    name: String,
}

impl AzureContainer {
    fn blob_url(&self, blob: &str) -> Result<Url> {
        naming::validate_blob_name(blob)?;
        self.account.url(&self.name, Some(blob), &[])
    }

    fn context(&self, action: &str, blob: &str) -> String {
        format!("{} {}/{}", action, self.name, blob)
    }
}

/// Pagination state of a lazy listing.
struct ListState {
    account: Arc<AzureAccount>,
    container: String,
    pending: VecDeque<BlobMetadata>,
    marker: Option<String>,
    exhausted: bool,
}

#[async_trait]
impl ContainerHandle for AzureContainer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn download_blob(&self, blob: &str) -> Result<BlobDownload> {
        let url = self.blob_url(blob)?;
        let response = self
            .account
            .call(Method::GET, url, HeaderMap::new(), None, &self.context("downloading", blob))
            .await?;

        let content_length = response.content_length();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
            .boxed();

        Ok(BlobDownload {
            content_length,
            content_type,
            body,
        })
    }

    async fn blob_size(&self, blob: &str) -> Result<u64> {
        let context = self.context("reading size of", blob);
        let url = self.blob_url(blob)?;
        let response = self
            .account
            .call(Method::HEAD, url, HeaderMap::new(), None, &context)
            .await?;

        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| error_map::internal("missing Content-Length", &context))
    }

    async fn upload_blob(
        &self,
        blob: &str,
        content: ByteStream,
        declared_length: u64,
    ) -> Result<()> {
        let url = self.blob_url(blob)?;
        let content_type = mime_guess::from_path(blob).first_or_octet_stream();

        let mut headers = HeaderMap::new();
        headers.insert("x-ms-blob-type", HeaderValue::from_static("BlockBlob"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from(declared_length));
        headers.insert(CONTENT_TYPE, header_value(content_type.essence_str())?);

        self.account
            .call(
                Method::PUT,
                url,
                headers,
                Some(reqwest::Body::wrap_stream(content)),
                &self.context("uploading", blob),
            )
            .await?;

        debug!(container = %self.name, blob = %blob, size = declared_length, "Blob uploaded");
        Ok(())
    }

    async fn delete_blob(&self, blob: &str) -> Result<()> {
        let url = self.blob_url(blob)?;
        self.account
            .call(Method::DELETE, url, HeaderMap::new(), None, &self.context("deleting", blob))
            .await?;
        Ok(())
    }

    async fn list_blobs(&self) -> Result<BlobListing> {
        let state = ListState {
            account: Arc::clone(&self.account),
            container: self.name.clone(),
            pending: VecDeque::new(),
            marker: None,
            exhausted: false,
        };

        let listing = stream::try_unfold(state, |mut state| async move {
            loop {
                if let Some(blob) = state.pending.pop_front() {
                    return Ok::<_, GatewayError>(Some((blob, state)));
                }
                if state.exhausted {
                    return Ok(None);
                }

                let page = state
                    .account
                    .list_page(&state.container, state.marker.as_deref())
                    .await?;
                state.pending.extend(page.blobs);
                state.exhausted = page.next_marker.is_none();
                state.marker = page.next_marker;
            }
        });

        Ok(listing.boxed())
    }

    async fn delete(&self) -> Result<()> {
        let context = format!("deleting container {}", self.name);
        let url = self.account.container_url(&self.name, &[])?;
        self.account
            .call(Method::DELETE, url, HeaderMap::new(), None, &context)
            .await?;
        info!(container = %self.name, "Container deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::listing::encode_listing;
    use bytes::Bytes;
    use mockito::{Matcher, Server, ServerGuard};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const KEY: &str = "a2V5MQ==";

    fn backend(server: &ServerGuard) -> AzureBlobBackend {
        let config = AzureConfig {
            endpoint: format!("{}/{{account}}", server.url()),
            ..AzureConfig::default()
        };
        AzureBlobBackend::new(&config).unwrap()
    }

    async fn session(server: &ServerGuard) -> Box<dyn BackendSession> {
        backend(server)
            .connect(&Credentials::new("user1", KEY))
            .await
            .unwrap()
    }

    fn container_query() -> Matcher {
        Matcher::UrlEncoded("restype".into(), "container".into())
    }

    fn signed() -> Matcher {
        Matcher::Regex("^SharedKey user1:".into())
    }

    #[test]
    fn test_endpoint_template_is_required() {
        let config = AzureConfig {
            endpoint: "https://static.blob.core.windows.net".to_string(),
            ..AzureConfig::default()
        };
        assert!(AzureBlobBackend::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_connect_validates_credentials() {
        let server = Server::new_async().await;
        let backend = backend(&server);

        for creds in [
            Credentials::new("User_1", KEY),
            Credentials::new("user1", "***"),
        ] {
            let err = backend.connect(&creds).await.err().unwrap();
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
        }
    }

    #[tokio::test]
    async fn test_container_exists() {
        let mut server = Server::new_async().await;
        let found = server
            .mock("GET", "/user1/pics")
            .match_query(container_query())
            .match_header("authorization", signed())
            .match_header("x-ms-version", "2021-08-06")
            .with_status(200)
            .create_async()
            .await;
        let missing = server
            .mock("GET", "/user1/gone")
            .match_query(container_query())
            .with_status(404)
            .with_header(ERROR_CODE_HEADER, "ContainerNotFound")
            .create_async()
            .await;

        let session = session(&server).await;
        assert!(session.container_exists("pics").await.unwrap());
        assert!(!session.container_exists("gone").await.unwrap());
        found.assert_async().await;
        missing.assert_async().await;
    }

    #[tokio::test]
    async fn test_resolve_missing_container() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/user1/gone")
            .match_query(container_query())
            .with_status(404)
            .create_async()
            .await;

        let session = session(&server).await;
        let err = session.resolve_container("gone", true).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        // Without the existence check no request is made
        assert!(session.resolve_container("gone", false).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_container_is_idempotent() {
        let mut server = Server::new_async().await;
        let create = server
            .mock("PUT", "/user1/pics")
            .match_query(container_query())
            .with_status(409)
            .with_header(ERROR_CODE_HEADER, "ContainerAlreadyExists")
            .create_async()
            .await;

        let session = session(&server).await;
        session.create_container_if_absent("pics").await.unwrap();
        create.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_container_being_deleted_fails() {
        let mut server = Server::new_async().await;
        server
            .mock("PUT", "/user1/pics")
            .match_query(container_query())
            .with_status(409)
            .with_header(ERROR_CODE_HEADER, CONTAINER_BEING_DELETED)
            .create_async()
            .await;

        let session = session(&server).await;
        let err = session.create_container_if_absent("pics").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendInternal);
    }

    #[tokio::test]
    async fn test_upload_and_download() {
        let mut server = Server::new_async().await;
        let upload = server
            .mock("PUT", "/user1/pics/photos/a.jpg")
            .match_header("authorization", signed())
            .match_header("x-ms-blob-type", "BlockBlob")
            .match_header("content-type", "image/jpeg")
            .match_header("content-length", "3")
            .match_body("abc")
            .with_status(201)
            .create_async()
            .await;
        let download = server
            .mock("GET", "/user1/pics/photos/a.jpg")
            .with_status(200)
            .with_header("content-type", "image/jpeg")
            .with_body("abc")
            .create_async()
            .await;

        let container = session(&server)
            .await
            .resolve_container("pics", false)
            .await
            .unwrap();

        let content: ByteStream =
            stream::iter(vec![Ok(Bytes::from_static(b"ab")), Ok(Bytes::from_static(b"c"))]).boxed();
        container
            .upload_blob("photos/a.jpg", content, 3)
            .await
            .unwrap();
        upload.assert_async().await;

        let blob = container.download_blob("photos/a.jpg").await.unwrap();
        assert_eq!(blob.content_length, Some(3));
        assert_eq!(blob.content_type.as_deref(), Some("image/jpeg"));
        let chunks: Vec<Bytes> = blob.body.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"abc");
        download.assert_async().await;
    }

    #[tokio::test]
    async fn test_blob_errors_are_mapped() {
        let mut server = Server::new_async().await;
        server
            .mock("HEAD", "/user1/pics/missing.jpg")
            .with_status(404)
            .with_header(ERROR_CODE_HEADER, "BlobNotFound")
            .create_async()
            .await;
        server
            .mock("DELETE", "/user1/pics/a.jpg")
            .with_status(503)
            .with_header(ERROR_CODE_HEADER, "ServerBusy")
            .create_async()
            .await;

        let container = session(&server)
            .await
            .resolve_container("pics", false)
            .await
            .unwrap();

        let err = container.blob_size("missing.jpg").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = container.delete_blob("a.jpg").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendInternal);
    }

    #[tokio::test]
    async fn test_listing_follows_markers() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("GET", "/user1/pics")
            .match_query(Matcher::Exact("restype=container&comp=list".into()))
            .with_status(200)
            .with_body(
                "<EnumerationResults><Blobs>\
                 <Blob><Name>a</Name><Properties><Content-Length>10</Content-Length></Properties></Blob>\
                 </Blobs><NextMarker>m1</NextMarker></EnumerationResults>",
            )
            .create_async()
            .await;
        let second = server
            .mock("GET", "/user1/pics")
            .match_query(Matcher::Exact("restype=container&comp=list&marker=m1".into()))
            .with_status(200)
            .with_body(
                "<EnumerationResults><Blobs>\
                 <Blob><Name>b</Name><Properties><Content-Length>20</Content-Length></Properties></Blob>\
                 </Blobs><NextMarker /></EnumerationResults>",
            )
            .create_async()
            .await;

        let container = session(&server)
            .await
            .resolve_container("pics", false)
            .await
            .unwrap();
        let blobs: Vec<BlobMetadata> = container
            .list_blobs()
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(
            blobs,
            vec![BlobMetadata::new("a", 10), BlobMetadata::new("b", 20)]
        );
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_upload_body_is_backend_error() {
        let mut server = Server::new_async().await;
        let upload = server
            .mock("PUT", "/user1/pics/a.jpg")
            .with_status(201)
            .expect(0)
            .create_async()
            .await;

        let container = session(&server)
            .await
            .resolve_container("pics", false)
            .await
            .unwrap();

        let content: ByteStream = stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
        ])
        .boxed();
        let err = container.upload_blob("a.jpg", content, 3).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendInternal);
        upload.assert_async().await;
    }

    #[tokio::test]
    async fn test_listing_page_failure_fails_the_document() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/user1/pics")
            .match_query(Matcher::Exact("restype=container&comp=list".into()))
            .with_status(200)
            .with_body(
                "<EnumerationResults><Blobs>\
                 <Blob><Name>a</Name><Properties><Content-Length>10</Content-Length></Properties></Blob>\
                 </Blobs><NextMarker>m1</NextMarker></EnumerationResults>",
            )
            .create_async()
            .await;
        server
            .mock("GET", "/user1/pics")
            .match_query(Matcher::Exact("restype=container&comp=list&marker=m1".into()))
            .with_status(503)
            .with_header(ERROR_CODE_HEADER, "ServerBusy")
            .create_async()
            .await;

        let container = session(&server)
            .await
            .resolve_container("pics", false)
            .await
            .unwrap();
        let listing = container.list_blobs().await.unwrap();
        let err = encode_listing(listing).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendInternal);
    }

    /// Serves one response whose body trickles out a byte at a time.
    async fn trickle_server(body: &'static [u8], gap: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            for byte in body {
                tokio::time::sleep(gap).await;
                socket.write_all(&[*byte]).await.unwrap();
                socket.flush().await.unwrap();
            }
        });

        format!("http://{}/{{account}}", addr)
    }

    #[tokio::test]
    async fn test_slow_download_outlives_idle_timeout() {
        let endpoint = trickle_server(b"abcdef", Duration::from_millis(300)).await;
        let backend = AzureBlobBackend::new(&AzureConfig {
            endpoint,
            timeout_secs: 1,
            ..AzureConfig::default()
        })
        .unwrap();

        let container = backend
            .connect(&Credentials::new("user1", KEY))
            .await
            .unwrap()
            .resolve_container("pics", false)
            .await
            .unwrap();

        // Roughly 1.8s in total, but never more than 300ms between bytes
        let blob = container.download_blob("a.bin").await.unwrap();
        assert_eq!(blob.content_length, Some(6));
        let chunks: Vec<Bytes> = blob.body.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"abcdef");
    }

    #[tokio::test]
    async fn test_delete_container() {
        let mut server = Server::new_async().await;
        let delete = server
            .mock("DELETE", "/user1/pics")
            .match_query(container_query())
            .with_status(202)
            .create_async()
            .await;

        let container = session(&server)
            .await
            .resolve_container("pics", false)
            .await
            .unwrap();
        container.delete().await.unwrap();
        delete.assert_async().await;
    }
}
