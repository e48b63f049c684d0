//! In-memory storage provider
//!
//! Each (account, container) pair is backed by its own
//! `object_store::memory::InMemory`. Any syntactically valid account name
//! works and keys are not checked. Data lives as long as the process.

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore, PutPayloadMut};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use crate::auth::Credentials;
use crate::errors::{GatewayError, Result};
use crate::storage::{
    error_map, naming, BackendSession, BlobDownload, BlobListing, BlobMetadata, ByteStream,
    ContainerHandle, StorageBackend,
};

const LIST_PAGE_SIZE: usize = 1000;

type ContainerKey = (String, String);

#[derive(Default)]
struct MemoryState {
    containers: RwLock<HashMap<ContainerKey, Arc<InMemory>>>,
}

impl MemoryState {
    fn key(account: &str, container: &str) -> ContainerKey {
        (account.to_string(), container.to_string())
    }

    fn get(&self, account: &str, container: &str) -> Result<Option<Arc<InMemory>>> {
        let containers = self
            .containers
            .read()
            .map_err(|e| error_map::internal(e, "reading container table"))?;
        Ok(containers.get(&Self::key(account, container)).cloned())
    }

    fn create(&self, account: &str, container: &str) -> Result<bool> {
        let mut containers = self
            .containers
            .write()
            .map_err(|e| error_map::internal(e, "updating container table"))?;
        let key = Self::key(account, container);
        if containers.contains_key(&key) {
            return Ok(false);
        }
        containers.insert(key, Arc::new(InMemory::new()));
        Ok(true)
    }

    fn remove(&self, account: &str, container: &str) -> Result<bool> {
        let mut containers = self
            .containers
            .write()
            .map_err(|e| error_map::internal(e, "updating container table"))?;
        Ok(containers.remove(&Self::key(account, container)).is_some())
    }
}

/// Process-local backend, registered as `memory`.
#[derive(Default)]
pub struct MemoryBackend {
    state: Arc<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self, credentials: &Credentials) -> Result<Box<dyn BackendSession>> {
        naming::validate_account_name(credentials.username())?;
        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
            account: credentials.username().to_string(),
        }))
    }
}

struct MemorySession {
    state: Arc<MemoryState>,
    account: String,
}

#[async_trait]
impl BackendSession for MemorySession {
    async fn resolve_container(
        &self,
        name: &str,
        must_exist: bool,
    ) -> Result<Box<dyn ContainerHandle>> {
        naming::validate_container_name(name)?;

        if must_exist && self.state.get(&self.account, name)?.is_none() {
            return Err(GatewayError::NotFound(format!("container {}", name)));
        }

        Ok(Box::new(MemoryContainer {
            state: Arc::clone(&self.state),
            account: self.account.clone(),
            name: name.to_string(),
        }))
    }

    async fn create_container_if_absent(&self, name: &str) -> Result<()> {
        naming::validate_container_name(name)?;
        if self.state.create(&self.account, name)? {
            info!(account = %self.account, container = %name, "Container created");
        }
        Ok(())
    }

    async fn container_exists(&self, name: &str) -> Result<bool> {
        naming::validate_container_name(name)?;
        Ok(self.state.get(&self.account, name)?.is_some())
    }
}

struct MemoryContainer {
    state: Arc<MemoryState>,
    account: String,
    name: String,
}

impl MemoryContainer {
    /// The container's store, looked up per call so that a concurrent
    /// delete is observed.
    fn store(&self) -> Result<Arc<InMemory>> {
        self.state
            .get(&self.account, &self.name)?
            .ok_or_else(|| GatewayError::NotFound(format!("container {}", self.name)))
    }

    fn path(&self, blob: &str) -> Result<Path> {
        naming::validate_blob_name(blob)?;
        Path::parse(blob).map_err(|source| {
            error_map::from_object_store(
                object_store::Error::InvalidPath { source },
                &format!("blob name {}", blob),
            )
        })
    }

    fn context(&self, action: &str, blob: &str) -> String {
        format!("{} {}/{}", action, self.name, blob)
    }
}

struct ListState {
    store: Arc<InMemory>,
    pending: VecDeque<ObjectMeta>,
    offset: Option<Path>,
    exhausted: bool,
}

#[async_trait]
impl ContainerHandle for MemoryContainer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn download_blob(&self, blob: &str) -> Result<BlobDownload> {
        let path = self.path(blob)?;
        let result = self
            .store()?
            .get(&path)
            .await
            .map_err(|e| error_map::from_object_store(e, &self.context("downloading", blob)))?;

        let content_length = result.meta.size as u64;
        let body = result
            .into_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
            .boxed();

        Ok(BlobDownload {
            content_length: Some(content_length),
            content_type: None,
            body,
        })
    }

    async fn blob_size(&self, blob: &str) -> Result<u64> {
        let path = self.path(blob)?;
        let meta = self
            .store()?
            .head(&path)
            .await
            .map_err(|e| error_map::from_object_store(e, &self.context("reading size of", blob)))?;
        Ok(meta.size as u64)
    }

    async fn upload_blob(
        &self,
        blob: &str,
        mut content: ByteStream,
        declared_length: u64,
    ) -> Result<()> {
        let context = self.context("uploading", blob);
        let path = self.path(blob)?;
        let store = self.store()?;

        // Nothing is stored until the whole body has been read
        let mut payload = PutPayloadMut::new();
        while let Some(chunk) = content
            .try_next()
            .await
            .map_err(|e| error_map::from_io(e, &context))?
        {
            payload.push(chunk);
        }

        store
            .put(&path, payload.freeze())
            .await
            .map_err(|e| error_map::from_object_store(e, &context))?;

        debug!(container = %self.name, blob = %blob, size = declared_length, "Blob uploaded");
        Ok(())
    }

    async fn delete_blob(&self, blob: &str) -> Result<()> {
        let context = self.context("deleting", blob);
        let path = self.path(blob)?;
        let store = self.store()?;

        // Deleting a missing object succeeds in object_store
        store
            .head(&path)
            .await
            .map_err(|e| error_map::from_object_store(e, &context))?;
        store
            .delete(&path)
            .await
            .map_err(|e| error_map::from_object_store(e, &context))
    }

    async fn list_blobs(&self) -> Result<BlobListing> {
        let state = ListState {
            store: self.store()?,
            pending: VecDeque::new(),
            offset: None,
            exhausted: false,
        };

        let listing = stream::try_unfold(state, |mut state| async move {
            loop {
                if let Some(meta) = state.pending.pop_front() {
                    let blob = BlobMetadata::new(meta.location.to_string(), meta.size as u64);
                    return Ok::<_, GatewayError>(Some((blob, state)));
                }
                if state.exhausted {
                    return Ok(None);
                }

                let page: Vec<ObjectMeta> = match &state.offset {
                    Some(offset) => {
                        state
                            .store
                            .list_with_offset(None, offset)
                            .take(LIST_PAGE_SIZE)
                            .try_collect()
                            .await
                    }
                    None => state.store.list(None).take(LIST_PAGE_SIZE).try_collect().await,
                }
                .map_err(|e| error_map::from_object_store(e, "listing container"))?;

                state.exhausted = page.len() < LIST_PAGE_SIZE;
                state.offset = page.last().map(|meta| meta.location.clone());
                state.pending.extend(page);
            }
        });

        Ok(listing.boxed())
    }

    async fn delete(&self) -> Result<()> {
        if !self.state.remove(&self.account, &self.name)? {
            return Err(GatewayError::NotFound(format!("container {}", self.name)));
        }
        info!(account = %self.account, container = %self.name, "Container deleted");
        Ok(())
    }
}
