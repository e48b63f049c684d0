//! Configuration management for blobgate
//!
//! Supports configuration via:
//! - Environment variables (primary)
//! - Optional TOML config file (secondary)
//!
//! Environment variables take precedence over config file values.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::str::FromStr;

/// Storage providers that can be registered at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Azure Blob Storage
    AzureBlob,
    /// In-process store, for development and tests
    Memory,
}

impl ProviderKind {
    /// Name clients use in request paths
    pub fn registry_name(&self) -> &'static str {
        match self {
            ProviderKind::AzureBlob => "azureblob",
            ProviderKind::Memory => "memory",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "azureblob" | "azure" => Ok(ProviderKind::AzureBlob),
            "memory" | "mem" => Ok(ProviderKind::Memory),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// Azure Blob Storage settings shared by all accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureConfig {
    /// Blob service endpoint; `{account}` is replaced by the request's
    /// account name. Path-style endpoints (Azurite) are supported.
    #[serde(default = "default_azure_endpoint")]
    pub endpoint: String,

    /// Value of the `x-ms-version` header
    #[serde(default = "default_azure_api_version")]
    pub api_version: String,

    /// Longest wait for the service to send data, in seconds (default: 300).
    /// Transfers that keep making progress are never cut off.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// TCP/TLS connect timeout in seconds (default: 30)
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            endpoint: default_azure_endpoint(),
            api_version: default_azure_api_version(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_azure_endpoint() -> String {
    "https://{account}.blob.core.windows.net".to_string()
}

fn default_azure_api_version() -> String {
    "2021-08-06".to_string()
}

/// Provider registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Providers to register (default: azureblob)
    #[serde(default = "default_enabled_providers")]
    pub enabled: Vec<ProviderKind>,

    #[serde(default)]
    pub azure: AzureConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_providers(),
            azure: AzureConfig::default(),
        }
    }
}

fn default_enabled_providers() -> Vec<ProviderKind> {
    vec![ProviderKind::AzureBlob]
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Deadline in seconds for requests that do not stream a body, and the
    /// longest pause allowed between chunks of an upload (default: 300)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Max upload size in bytes (default: 5GB)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            timeout_secs: default_timeout_secs(),
            max_body_size: default_max_body_size(),
        }
    }
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_body_size() -> u64 {
    5 * 1024 * 1024 * 1024 // 5GB
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Registered storage providers
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Log level used when RUST_LOG is unset (default: info)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            providers: ProvidersConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - BLOBGATE_CONFIG_FILE: optional path to TOML config file
    /// - BLOBGATE_BIND_ADDRESS: server bind address (default: 0.0.0.0:8080)
    /// - BLOBGATE_TIMEOUT_SECS: request timeout (default: 300)
    /// - BLOBGATE_MAX_BODY_SIZE: max upload size in bytes (default: 5GB)
    /// - BLOBGATE_LOG_LEVEL: log level (default: info)
    /// - BLOBGATE_PROVIDERS: comma separated providers (default: azureblob)
    /// - BLOBGATE_AZURE_ENDPOINT: endpoint template containing `{account}`
    /// - BLOBGATE_AZURE_API_VERSION: x-ms-version header value
    /// - BLOBGATE_AZURE_TIMEOUT_SECS: backend read (idle) timeout
    /// - BLOBGATE_AZURE_CONNECT_TIMEOUT_SECS: backend connect timeout
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = match std::env::var("BLOBGATE_CONFIG_FILE") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply `BLOBGATE_*` overrides from `lookup`
    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), Box<dyn std::error::Error>>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("BLOBGATE_BIND_ADDRESS") {
            self.server.bind_address = addr.parse()?;
        }

        if let Some(timeout) = lookup("BLOBGATE_TIMEOUT_SECS") {
            self.server.timeout_secs = timeout.parse()?;
        }

        if let Some(size) = lookup("BLOBGATE_MAX_BODY_SIZE") {
            self.server.max_body_size = size.parse()?;
        }

        if let Some(level) = lookup("BLOBGATE_LOG_LEVEL") {
            self.log_level = level;
        }

        if let Some(providers) = lookup("BLOBGATE_PROVIDERS") {
            self.providers.enabled = providers
                .split(',')
                .filter(|p| !p.trim().is_empty())
                .map(ProviderKind::from_str)
                .collect::<Result<_, _>>()?;
        }

        if let Some(endpoint) = lookup("BLOBGATE_AZURE_ENDPOINT") {
            self.providers.azure.endpoint = endpoint;
        }

        if let Some(version) = lookup("BLOBGATE_AZURE_API_VERSION") {
            self.providers.azure.api_version = version;
        }

        if let Some(timeout) = lookup("BLOBGATE_AZURE_TIMEOUT_SECS") {
            self.providers.azure.timeout_secs = timeout.parse()?;
        }

        if let Some(timeout) = lookup("BLOBGATE_AZURE_CONNECT_TIMEOUT_SECS") {
            self.providers.azure.connect_timeout_secs = timeout.parse()?;
        }

        Ok(())
    }
}
