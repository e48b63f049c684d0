//! Provider registry: name -> backend.
//!
//! Built once at startup and shared behind an `Arc`. Nothing mutates it
//! afterwards, so concurrent resolution needs no locking.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::{Config, ProviderKind};
use crate::errors::{GatewayError, Result};
use crate::storage::{AzureBlobBackend, MemoryBackend, StorageBackend};

/// Registration failures at startup
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Provider '{0}' is already registered")]
    Duplicate(String),
}

/// Immutable mapping from provider name to backend implementation.
#[derive(Default)]
pub struct ProviderRegistry {
    backends: HashMap<String, Arc<dyn StorageBackend>>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry for the providers enabled in `config`.
    pub fn from_config(config: &Config) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let mut registry = Self::new();

        for kind in &config.providers.enabled {
            let backend: Arc<dyn StorageBackend> = match kind {
                ProviderKind::AzureBlob => Arc::new(AzureBlobBackend::new(&config.providers.azure)?),
                ProviderKind::Memory => Arc::new(MemoryBackend::new()),
            };
            registry.register(kind.registry_name(), backend)?;
            info!(provider = kind.registry_name(), "Storage provider registered");
        }

        Ok(registry)
    }

    /// Register a backend under `name`.
    ///
    /// # Errors
    /// - `name` is already registered
    pub fn register(
        &mut self,
        name: impl Into<String>,
        backend: Arc<dyn StorageBackend>,
    ) -> std::result::Result<(), RegistryError> {
        let name = name.into();
        if self.backends.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.backends.insert(name, backend);
        Ok(())
    }

    /// Look up the backend registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn StorageBackend>> {
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::UnsupportedProvider(name.to_string()))
    }

    /// Registered provider names, sorted.
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_register_and_resolve() {
        let mut registry = ProviderRegistry::new();
        registry
            .register("memory", Arc::new(MemoryBackend::new()))
            .unwrap();

        let backend = registry.resolve("memory").unwrap();
        assert_eq!(backend.name(), "memory");
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = ProviderRegistry::new();
        registry
            .register("memory", Arc::new(MemoryBackend::new()))
            .unwrap();

        let result = registry.register("memory", Arc::new(MemoryBackend::new()));
        assert!(matches!(result, Err(RegistryError::Duplicate(name)) if name == "memory"));
    }

    #[test]
    fn test_resolve_unknown_fails() {
        let registry = ProviderRegistry::new();
        for name in ["azureblob", "s3", ""] {
            let err = registry.resolve(name).err().unwrap();
            assert_eq!(err.kind(), ErrorKind::UnsupportedProvider);
        }
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.providers.enabled = vec![ProviderKind::Memory, ProviderKind::AzureBlob];

        let registry = ProviderRegistry::from_config(&config).unwrap();
        assert_eq!(registry.providers(), vec!["azureblob", "memory"]);
        assert_eq!(registry.resolve("azureblob").unwrap().name(), "azureblob");
        assert!(registry.resolve("gcs").is_err());
    }

    #[test]
    fn test_from_config_rejects_duplicates() {
        let mut config = Config::default();
        config.providers.enabled = vec![ProviderKind::Memory, ProviderKind::Memory];
        assert!(ProviderRegistry::from_config(&config).is_err());
    }
}
