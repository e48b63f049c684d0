//! Blob operations exposed to the router.
//!
//! Every operation follows the same handshake: resolve the provider, open a
//! session with the caller's credentials, resolve the container, then make
//! one backend call. Errors come back as taxonomy kinds and are also counted
//! per provider and operation.

use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::auth::Credentials;
use crate::errors::Result;
use crate::listing;
use crate::metrics::OperationTimer;
use crate::storage::stream::ExactLength;
use crate::storage::{
    BackendSession, BlobDownload, ByteStream, ContainerHandle, ProviderRegistry,
};

/// Provider-independent operation surface.
#[derive(Clone)]
pub struct Gateway {
    registry: Arc<ProviderRegistry>,
}

impl Gateway {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    /// Registered provider names, sorted.
    pub fn providers(&self) -> Vec<String> {
        self.registry.providers()
    }

    /// At least one provider is registered.
    pub fn is_ready(&self) -> bool {
        !self.registry.is_empty()
    }

    async fn session(
        &self,
        provider: &str,
        credentials: &Credentials,
    ) -> Result<Box<dyn BackendSession>> {
        let backend = self.registry.resolve(provider)?;
        backend.connect(credentials).await
    }

    async fn existing_container(
        &self,
        provider: &str,
        container: &str,
        credentials: &Credentials,
    ) -> Result<Box<dyn ContainerHandle>> {
        self.session(provider, credentials)
            .await?
            .resolve_container(container, true)
            .await
    }

    #[instrument(skip(self, credentials))]
    pub async fn download_blob(
        &self,
        provider: &str,
        container: &str,
        blob: &str,
        credentials: &Credentials,
    ) -> Result<BlobDownload> {
        let timer = OperationTimer::start(provider, "download_blob");
        let result = async {
            self.existing_container(provider, container, credentials)
                .await?
                .download_blob(blob)
                .await
        }
        .await;
        timer.observe(&result);
        result
    }

    #[instrument(skip(self, credentials))]
    pub async fn blob_size(
        &self,
        provider: &str,
        container: &str,
        blob: &str,
        credentials: &Credentials,
    ) -> Result<u64> {
        let timer = OperationTimer::start(provider, "blob_size");
        let result = async {
            self.existing_container(provider, container, credentials)
                .await?
                .blob_size(blob)
                .await
        }
        .await;
        timer.observe(&result);
        result
    }

    /// Stream `content` into `blob`, replacing any previous content.
    ///
    /// The stream must carry exactly `declared_length` bytes, otherwise the
    /// upload fails and nothing is committed.
    #[instrument(skip(self, credentials, content))]
    pub async fn upload_blob(
        &self,
        provider: &str,
        container: &str,
        blob: &str,
        credentials: &Credentials,
        content: ByteStream,
        declared_length: u64,
    ) -> Result<()> {
        let timer = OperationTimer::start(provider, "upload_blob");
        let result = async {
            let handle = self
                .existing_container(provider, container, credentials)
                .await?;
            let content = ExactLength::new(content, declared_length).boxed();
            handle.upload_blob(blob, content, declared_length).await
        }
        .await;
        timer.observe(&result);
        result
    }

    #[instrument(skip(self, credentials))]
    pub async fn delete_blob(
        &self,
        provider: &str,
        container: &str,
        blob: &str,
        credentials: &Credentials,
    ) -> Result<()> {
        let timer = OperationTimer::start(provider, "delete_blob");
        let result = async {
            self.existing_container(provider, container, credentials)
                .await?
                .delete_blob(blob)
                .await
        }
        .await;
        timer.observe(&result);
        result
    }

    /// Encoded listing document for the container.
    #[instrument(skip(self, credentials))]
    pub async fn list_blobs(
        &self,
        provider: &str,
        container: &str,
        credentials: &Credentials,
    ) -> Result<Bytes> {
        let timer = OperationTimer::start(provider, "list_blobs");
        let result = async {
            let listing = self
                .existing_container(provider, container, credentials)
                .await?
                .list_blobs()
                .await?;
            listing::encode_listing(listing).await
        }
        .await;
        if let Ok(document) = &result {
            debug!(container = %container, bytes = document.len(), "Listing encoded");
        }
        timer.observe(&result);
        result
    }

    #[instrument(skip(self, credentials))]
    pub async fn create_container_if_absent(
        &self,
        provider: &str,
        container: &str,
        credentials: &Credentials,
    ) -> Result<()> {
        let timer = OperationTimer::start(provider, "create_container");
        let result = async {
            self.session(provider, credentials)
                .await?
                .create_container_if_absent(container)
                .await
        }
        .await;
        timer.observe(&result);
        result
    }

    #[instrument(skip(self, credentials))]
    pub async fn container_exists(
        &self,
        provider: &str,
        container: &str,
        credentials: &Credentials,
    ) -> Result<bool> {
        let timer = OperationTimer::start(provider, "container_exists");
        let result = async {
            self.session(provider, credentials)
                .await?
                .container_exists(container)
                .await
        }
        .await;
        timer.observe(&result);
        result
    }

    #[instrument(skip(self, credentials))]
    pub async fn delete_container(
        &self,
        provider: &str,
        container: &str,
        credentials: &Credentials,
    ) -> Result<()> {
        let timer = OperationTimer::start(provider, "delete_container");
        let result = async {
            self.existing_container(provider, container, credentials)
                .await?
                .delete()
                .await
        }
        .await;
        timer.observe(&result);
        result
    }
}
