//! Storage error types.

use thiserror::Error;
use trackline_shared::AppError;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Storage provider configuration error.
    #[error("storage configuration error: {0}")]
    Configuration(String),

    /// Reference is not a canonical object path.
    #[error("invalid object path: {0}")]
    InvalidObjectPath(String),

    /// Object not found in storage.
    #[error("object not found: {path}")]
    NotFound {
        /// Canonical path that was not found.
        path: String,
    },

    /// Presign operation not supported by provider.
    #[error("presign operation not supported by storage provider")]
    PresignNotSupported,

    /// Credential broker exchange failed.
    #[error("credential exchange failed: {0}")]
    CredentialExchange(String),

    /// Underlying storage operation error.
    #[error("storage operation failed: {0}")]
    Operation(String),
}

impl StorageError {
    /// Create a configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an invalid object path error.
    #[must_use]
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidObjectPath(path.into())
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a credential exchange error.
    #[must_use]
    pub fn credential_exchange(msg: impl Into<String>) -> Self {
        Self::CredentialExchange(msg.into())
    }

    /// Create an operation error.
    #[must_use]
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }
}

impl From<opendal::Error> for StorageError {
    fn from(err: opendal::Error) -> Self {
        match err.kind() {
            opendal::ErrorKind::NotFound => Self::NotFound {
                path: err.to_string(),
            },
            opendal::ErrorKind::Unsupported => Self::PresignNotSupported,
            _ => Self::Operation(err.to_string()),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Configuration(msg) => Self::Configuration(msg),
            StorageError::InvalidObjectPath(path) => {
                Self::Validation(format!("invalid object path: {path}"))
            }
            StorageError::NotFound { path } => Self::NotFound(path),
            other => Self::Provider(other.to_string()),
        }
    }
}
