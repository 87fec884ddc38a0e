//! Application configuration management.
//!
//! Configuration is resolved once at startup and immutable afterwards. Both
//! adapters consume the same `AppConfig` value; selector fields decide which
//! backend strategy each adapter builds.

use std::path::PathBuf;

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseSettings,
    /// Blob storage configuration.
    pub storage: StorageSettings,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Connection strategy selector: `edge-pooled` or `direct-tcp`.
    ///
    /// Missing selector defaults to `edge-pooled`; an unrecognized value is
    /// a configuration error, never a silent fallback.
    #[serde(default)]
    pub provider: Option<String>,
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection acquire timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    8
}

/// Blob storage configuration.
///
/// Which fields are required depends on the selected provider; the storage
/// adapter validates them at construction so misconfiguration surfaces at
/// startup, not on first use.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Storage strategy selector: `federated-cloud`, `local-filesystem`,
    /// or the not-yet-implemented `alternative-cloud`.
    #[serde(default)]
    pub provider: Option<String>,
    /// Root directory for the local filesystem strategy.
    #[serde(default)]
    pub local_root: Option<PathBuf>,
    /// Bucket name for the federated cloud strategy.
    #[serde(default)]
    pub bucket: Option<String>,
    /// Object store endpoint URL for the federated cloud strategy.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Object store region.
    #[serde(default)]
    pub region: Option<String>,
    /// Credential broker endpoint exchanging identity assertions for
    /// short-lived storage credentials.
    #[serde(default)]
    pub credential_broker_url: Option<String>,
    /// Local identity assertion presented to the credential broker.
    #[serde(default)]
    pub identity_token: Option<String>,
    /// Private root prefix inside the bucket; objects under it require
    /// signed URLs.
    #[serde(default = "default_private_root")]
    pub private_root: String,
    /// Canonical path prefixes that may be served with public cache headers.
    #[serde(default)]
    pub public_paths: Vec<String>,
    /// Upload ticket TTL in seconds (default: 900 = 15 minutes).
    #[serde(default = "default_upload_ttl")]
    pub upload_ttl_secs: u64,
    /// Signed download URL TTL in seconds (default: 3600 = 1 hour).
    #[serde(default = "default_download_ttl")]
    pub download_ttl_secs: u64,
    /// Fail hard instead of falling back to local storage when an
    /// unimplemented provider is selected. Recommended in production.
    #[serde(default)]
    pub strict_provider: bool,
}

fn default_private_root() -> String {
    ".private".to_string()
}

fn default_upload_ttl() -> u64 {
    900 // 15 minutes
}

fn default_download_ttl() -> u64 {
    3600 // 1 hour
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("TRACKLINE").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
