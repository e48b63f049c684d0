//! Storage backend abstraction layer
//!
//! A backend is reached in three steps, each a trait object so new providers
//! plug in without touching the router or the error taxonomy:
//!
//! 1. [`StorageBackend::connect`] turns request credentials into a session.
//! 2. [`BackendSession::resolve_container`] validates a container name and
//!    returns a handle, optionally checking that the container exists.
//! 3. [`ContainerHandle`] performs blob operations.
//!
//! Sessions and handles live for one request. Blob content always moves as a
//! [`ByteStream`] of bounded chunks; backends never buffer a whole object on
//! the download path.

mod azure;
pub mod error_map;
mod memory;
pub mod naming;
mod registry;
pub mod stream;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::fmt;

use crate::auth::Credentials;
use crate::errors::Result;

pub use azure::AzureBlobBackend;
pub use memory::MemoryBackend;
pub use registry::ProviderRegistry;

/// Blob content in transit, in either direction.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Lazy, single-pass enumeration of a container's blobs.
pub type BlobListing = BoxStream<'static, Result<BlobMetadata>>;

/// One entry of a container enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMetadata {
    pub name: String,
    pub size: u64,
}

impl BlobMetadata {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// A blob being downloaded.
pub struct BlobDownload {
    /// Total length, when the backend reports it
    pub content_length: Option<u64>,
    /// Content type stored with the blob, if any
    pub content_type: Option<String>,
    pub body: ByteStream,
}

impl fmt::Debug for BlobDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobDownload")
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Entry point of a storage provider.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Provider name used for logs and metrics
    fn name(&self) -> &'static str;

    /// Open a session with the given account credentials.
    ///
    /// Fails with `InvalidInput` when the account name or key is
    /// syntactically invalid for this backend.
    async fn connect(&self, credentials: &Credentials) -> Result<Box<dyn BackendSession>>;
}

/// Account-level operations for one request.
#[async_trait]
pub trait BackendSession: Send + Sync {
    /// Validate `name` and return a handle to the container.
    ///
    /// With `must_exist`, a missing container is `NotFound`.
    async fn resolve_container(
        &self,
        name: &str,
        must_exist: bool,
    ) -> Result<Box<dyn ContainerHandle>>;

    /// Create the container unless it already exists. Idempotent.
    async fn create_container_if_absent(&self, name: &str) -> Result<()>;

    /// Never fails with `NotFound`.
    async fn container_exists(&self, name: &str) -> Result<bool>;
}

/// Blob operations within one container.
#[async_trait]
pub trait ContainerHandle: Send + Sync {
    fn name(&self) -> &str;

    async fn download_blob(&self, blob: &str) -> Result<BlobDownload>;

    /// Size in bytes of an existing blob
    async fn blob_size(&self, blob: &str) -> Result<u64>;

    /// Store `content` under `blob`, replacing any previous content.
    ///
    /// The backend reads exactly `declared_length` bytes; callers are
    /// expected to wrap `content` in [`stream::ExactLength`].
    async fn upload_blob(&self, blob: &str, content: ByteStream, declared_length: u64)
        -> Result<()>;

    async fn delete_blob(&self, blob: &str) -> Result<()>;

    /// Enumerate blobs in backend order. An error item aborts the listing.
    async fn list_blobs(&self) -> Result<BlobListing>;

    /// Delete the container and everything in it.
    async fn delete(&self) -> Result<()>;
}
