//! Storage configuration types and provider selection.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;
use trackline_shared::StorageSettings;

use super::error::StorageError;

/// Storage provider configuration.
///
/// A closed set: every variant must implement the full adapter interface,
/// so adding a provider is a compile-time obligation, not a runtime
/// surprise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageProvider {
    /// Cloud object storage reached through federated, short-lived
    /// credentials issued by a co-located broker.
    FederatedCloud {
        /// Bucket name.
        bucket: String,
        /// Object store endpoint URL (None for the provider default).
        endpoint: Option<String>,
        /// Object store region.
        region: String,
        /// Credential broker endpoint.
        credential_broker_url: String,
        /// Local identity assertion presented to the broker.
        identity_token: String,
    },
    /// Local filesystem (development only).
    LocalFs {
        /// Root directory path.
        root: PathBuf,
    },
}

impl StorageProvider {
    /// Create a federated cloud provider.
    #[must_use]
    pub fn federated_cloud(
        bucket: impl Into<String>,
        endpoint: Option<String>,
        region: impl Into<String>,
        credential_broker_url: impl Into<String>,
        identity_token: impl Into<String>,
    ) -> Self {
        Self::FederatedCloud {
            bucket: bucket.into(),
            endpoint,
            region: region.into(),
            credential_broker_url: credential_broker_url.into(),
            identity_token: identity_token.into(),
        }
    }

    /// Create a local filesystem provider (development only).
    #[must_use]
    pub fn local_fs(root: impl Into<PathBuf>) -> Self {
        Self::LocalFs { root: root.into() }
    }

    /// Provider name for logs and persisted records.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::FederatedCloud { .. } => "federated-cloud",
            Self::LocalFs { .. } => "local",
        }
    }
}

/// Storage adapter configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Storage provider configuration.
    pub provider: StorageProvider,
    /// Private root prefix inside the bucket (cloud only).
    pub private_root: String,
    /// Canonical path prefixes served with public cache headers.
    pub public_paths: Vec<String>,
    /// Upload ticket TTL in seconds (default: 900 = 15 minutes).
    pub upload_ttl_secs: u64,
    /// Signed download URL TTL in seconds (default: 3600 = 1 hour).
    pub download_ttl_secs: u64,
}

impl StorageConfig {
    /// Default upload TTL: 15 minutes.
    pub const DEFAULT_UPLOAD_TTL: u64 = 900;
    /// Default download TTL: 1 hour.
    pub const DEFAULT_DOWNLOAD_TTL: u64 = 3600;
    /// Default private root prefix.
    pub const DEFAULT_PRIVATE_ROOT: &'static str = ".private";

    /// Create a new storage config with default settings.
    #[must_use]
    pub fn new(provider: StorageProvider) -> Self {
        Self {
            provider,
            private_root: Self::DEFAULT_PRIVATE_ROOT.to_string(),
            public_paths: Vec::new(),
            upload_ttl_secs: Self::DEFAULT_UPLOAD_TTL,
            download_ttl_secs: Self::DEFAULT_DOWNLOAD_TTL,
        }
    }

    /// Set the private root prefix.
    #[must_use]
    pub fn with_private_root(mut self, root: impl Into<String>) -> Self {
        self.private_root = root.into();
        self
    }

    /// Set the public path allowlist.
    #[must_use]
    pub fn with_public_paths(mut self, paths: Vec<String>) -> Self {
        self.public_paths = paths;
        self
    }

    /// Set the upload ticket TTL.
    #[must_use]
    pub fn with_upload_ttl(mut self, secs: u64) -> Self {
        self.upload_ttl_secs = secs;
        self
    }

    /// Set the signed download URL TTL.
    #[must_use]
    pub fn with_download_ttl(mut self, secs: u64) -> Self {
        self.download_ttl_secs = secs;
        self
    }

    /// Resolve deployment settings into a concrete provider configuration.
    ///
    /// Selection rules:
    /// - `federated-cloud` and `local-filesystem` map to their strategies,
    ///   failing fast when a required setting is absent
    /// - `alternative-cloud` is recognized but not implemented; it falls
    ///   back to the local filesystem with a warning, unless
    ///   `strict_provider` is set, in which case it is fatal
    /// - any other value, or a missing selector, is a fatal configuration
    ///   error
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Configuration` naming the offending setting.
    pub fn from_settings(settings: &StorageSettings) -> Result<Self, StorageError> {
        let provider = match settings.provider.as_deref() {
            Some("federated-cloud") => Self::cloud_provider(settings)?,
            Some("local-filesystem") => Self::local_provider(settings)?,
            Some("alternative-cloud") => {
                if settings.strict_provider {
                    return Err(StorageError::configuration(
                        "storage provider 'alternative-cloud' is not implemented \
                         and storage.strict_provider is set",
                    ));
                }
                warn!(
                    provider = "alternative-cloud",
                    "storage provider not implemented, falling back to local filesystem"
                );
                Self::local_provider(settings)?
            }
            Some(other) => {
                return Err(StorageError::configuration(format!(
                    "unknown storage provider '{other}'"
                )));
            }
            None => {
                return Err(StorageError::configuration(
                    "storage.provider is required",
                ));
            }
        };

        Ok(Self {
            provider,
            private_root: settings.private_root.clone(),
            public_paths: settings.public_paths.clone(),
            upload_ttl_secs: settings.upload_ttl_secs,
            download_ttl_secs: settings.download_ttl_secs,
        })
    }

    fn cloud_provider(settings: &StorageSettings) -> Result<StorageProvider, StorageError> {
        let bucket = settings
            .bucket
            .clone()
            .ok_or_else(|| StorageError::configuration("storage.bucket is required"))?;
        let broker = settings.credential_broker_url.clone().ok_or_else(|| {
            StorageError::configuration("storage.credential_broker_url is required")
        })?;
        let identity_token = settings
            .identity_token
            .clone()
            .ok_or_else(|| StorageError::configuration("storage.identity_token is required"))?;

        Ok(StorageProvider::FederatedCloud {
            bucket,
            endpoint: settings.endpoint.clone(),
            region: settings.region.clone().unwrap_or_else(|| "auto".to_string()),
            credential_broker_url: broker,
            identity_token,
        })
    }

    fn local_provider(settings: &StorageSettings) -> Result<StorageProvider, StorageError> {
        let root = settings
            .local_root
            .clone()
            .ok_or_else(|| StorageError::configuration("storage.local_root is required"))?;
        Ok(StorageProvider::LocalFs { root })
    }

    /// Check whether a canonical path may be served with public cache
    /// headers.
    #[must_use]
    pub fn is_public_path(&self, object_path: &str) -> bool {
        self.public_paths
            .iter()
            .any(|prefix| object_path.starts_with(prefix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn settings(provider: Option<&str>) -> StorageSettings {
        StorageSettings {
            provider: provider.map(String::from),
            local_root: Some(PathBuf::from("/tmp/trackline-objects")),
            bucket: Some("trackline-objects".to_string()),
            endpoint: Some("https://storage.example.com".to_string()),
            region: None,
            credential_broker_url: Some("http://127.0.0.1:1106/token".to_string()),
            identity_token: Some("assertion".to_string()),
            private_root: ".private".to_string(),
            public_paths: vec!["/objects/public".to_string()],
            upload_ttl_secs: 900,
            download_ttl_secs: 3600,
            strict_provider: false,
        }
    }

    #[rstest]
    #[case(Some("federated-cloud"), "federated-cloud")]
    #[case(Some("local-filesystem"), "local")]
    #[case(Some("alternative-cloud"), "local")] // unimplemented, falls back
    fn test_provider_selection(#[case] selector: Option<&str>, #[case] expected: &str) {
        let config =
            StorageConfig::from_settings(&settings(selector)).expect("selector resolves");
        assert_eq!(config.provider.name(), expected);
    }

    #[rstest]
    #[case(Some("carrier-pigeon"))]
    #[case(None)]
    fn test_unresolvable_provider_is_fatal(#[case] selector: Option<&str>) {
        let err = StorageConfig::from_settings(&settings(selector)).unwrap_err();
        assert!(matches!(err, StorageError::Configuration(_)));
    }

    #[test]
    fn test_cloud_region_defaults_to_auto() {
        let config = StorageConfig::from_settings(&settings(Some("federated-cloud")))
            .expect("should select cloud");
        match config.provider {
            StorageProvider::FederatedCloud { region, .. } => assert_eq!(region, "auto"),
            StorageProvider::LocalFs { .. } => panic!("expected cloud provider"),
        }
    }

    #[test]
    fn test_unimplemented_provider_strict_is_fatal() {
        let mut s = settings(Some("alternative-cloud"));
        s.strict_provider = true;
        let err = StorageConfig::from_settings(&s).unwrap_err();
        assert!(matches!(err, StorageError::Configuration(_)));
    }

    #[test]
    fn test_cloud_requires_bucket() {
        let mut s = settings(Some("federated-cloud"));
        s.bucket = None;
        let err = StorageConfig::from_settings(&s).unwrap_err();
        assert!(err.to_string().contains("storage.bucket"));
    }

    #[test]
    fn test_cloud_requires_broker() {
        let mut s = settings(Some("federated-cloud"));
        s.credential_broker_url = None;
        let err = StorageConfig::from_settings(&s).unwrap_err();
        assert!(err.to_string().contains("credential_broker_url"));
    }

    #[test]
    fn test_local_requires_root() {
        let mut s = settings(Some("local-filesystem"));
        s.local_root = None;
        let err = StorageConfig::from_settings(&s).unwrap_err();
        assert!(err.to_string().contains("storage.local_root"));
    }

    #[test]
    fn test_public_path_check() {
        let config = StorageConfig::new(StorageProvider::local_fs("./objects"))
            .with_public_paths(vec!["/objects/public".to_string()]);
        assert!(config.is_public_path("/objects/public/logo.png"));
        assert!(!config.is_public_path("/objects/uploads/abc"));
    }
}
