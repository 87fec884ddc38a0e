//! Error-to-response mapping for the API layer.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;
use trackline_shared::AppError;

/// Wrapper turning `AppError` into an HTTP response.
///
/// Server-side errors are logged with full detail; the response body only
/// carries the taxonomy code and message, never provider internals.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl From<trackline_core::storage::StorageError> for ApiError {
    fn from(err: trackline_core::storage::StorageError) -> Self {
        Self(err.into())
    }
}

impl From<trackline_db::DbAdapterError> for ApiError {
    fn from(err: trackline_db::DbAdapterError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(code = self.0.error_code(), detail = %self.0, "request failed");
        }

        let body = json!({
            "error": {
                "code": self.0.error_code(),
                "message": self.0.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let response = ApiError(AppError::NotFound("gone".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_provider_error_maps_to_500() {
        let response = ApiError(AppError::Provider("boom".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
