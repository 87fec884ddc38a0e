//! Application-wide error types.

use thiserror::Error;

/// Result type alias using `AppError`.
pub type AppResult<T> = Result<T, AppError>;

/// Application error types.
///
/// The resource layer distinguishes four situations: a missing or invalid
/// required setting (fatal at startup), an operation attempted against a
/// torn-down adapter (programmer error), a missing object (404-style, not
/// fatal), and everything the underlying provider rejected or failed.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or invalid required configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Operation attempted before connect or after disconnect.
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The underlying database or storage provider failed.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Validation(_) => 400,
            Self::Configuration(_) | Self::NotConnected(_) | Self::Provider(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::NotConnected(_) => "NOT_CONNECTED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Provider(_) => "PROVIDER_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(AppError::Configuration(String::new()).status_code(), 500);
        assert_eq!(AppError::NotConnected(String::new()).status_code(), 500);
        assert_eq!(AppError::NotFound(String::new()).status_code(), 404);
        assert_eq!(AppError::Validation(String::new()).status_code(), 400);
        assert_eq!(AppError::Provider(String::new()).status_code(), 500);
        assert_eq!(AppError::Internal(String::new()).status_code(), 500);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::Configuration(String::new()).error_code(),
            "CONFIGURATION_ERROR"
        );
        assert_eq!(
            AppError::NotConnected(String::new()).error_code(),
            "NOT_CONNECTED"
        );
        assert_eq!(AppError::NotFound(String::new()).error_code(), "NOT_FOUND");
        assert_eq!(
            AppError::Validation(String::new()).error_code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            AppError::Provider(String::new()).error_code(),
            "PROVIDER_ERROR"
        );
        assert_eq!(
            AppError::Internal(String::new()).error_code(),
            "INTERNAL_ERROR"
        );
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            AppError::Configuration("msg".into()).to_string(),
            "Configuration error: msg"
        );
        assert_eq!(
            AppError::NotConnected("msg".into()).to_string(),
            "Not connected: msg"
        );
        assert_eq!(
            AppError::NotFound("msg".into()).to_string(),
            "Not found: msg"
        );
        assert_eq!(
            AppError::Provider("msg".into()).to_string(),
            "Provider error: msg"
        );
    }
}
