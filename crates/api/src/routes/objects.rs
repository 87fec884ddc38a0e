//! Object storage routes.
//!
//! The HTTP surface the storage adapter contractually requires: issuing
//! upload tickets, accepting mediated PUT uploads for the local strategy,
//! and streaming downloads for canonical `/objects/...` paths.

use std::collections::HashMap;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::Response;
use axum::routing::{post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;
use trackline_shared::AppError;

/// Creates the object routes mounted under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/objects/upload-url", post(request_upload_url))
        .route("/objects/uploads/{id}", put(upload_object))
}

/// Request body for an upload ticket.
#[derive(Debug, Deserialize)]
pub struct UploadUrlRequest {
    /// Original filename (informational; the stored identifier is fresh).
    pub filename: String,
    /// MIME type of the file.
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Upload ticket response.
#[derive(Debug, Serialize)]
pub struct UploadUrlResponse {
    /// Where to PUT the bytes.
    pub upload_url: String,
    /// Canonical path the caller must persist.
    pub object_path: String,
    /// HTTP method to use.
    pub method: String,
    /// Required headers for the upload request.
    pub headers: HashMap<String, String>,
    /// When the ticket expires.
    pub expires_at: DateTime<Utc>,
}

/// Issue an upload ticket for a new object.
async fn request_upload_url(
    State(state): State<AppState>,
    Json(body): Json<UploadUrlRequest>,
) -> Result<Json<UploadUrlResponse>, ApiError> {
    let storage = state.registry.storage().await?;
    let ticket = storage
        .issue_upload_ticket(&body.filename, body.content_type.as_deref())
        .await?;

    Ok(Json(UploadUrlResponse {
        upload_url: ticket.upload_url,
        object_path: ticket.object_path,
        method: ticket.method,
        headers: ticket.headers,
        expires_at: ticket.expires_at,
    }))
}

/// Accept a mediated upload for the local filesystem strategy.
///
/// Cloud strategies issue provider-signed URLs instead; a PUT here under
/// those strategies is a caller error.
///
/// Tickets are single-use: once an object exists at the target path, the
/// path cannot be written again. Ticket expiry is not enforced for the
/// local strategy; the ticket carries no verifiable token the handler
/// could check, so an unwritten identifier stays writable past `expires_at`.
async fn upload_object(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Body,
) -> Result<StatusCode, ApiError> {
    let storage = state.registry.storage().await?;
    if !storage.uploads_are_mediated() {
        return Err(AppError::Validation(
            "uploads must be sent to the issued upload URL".to_string(),
        )
        .into());
    }

    let object_path = format!("/objects/uploads/{id}");
    if storage.exists(&object_path).await? {
        return Err(AppError::Validation(
            "upload target already written; request a new upload URL".to_string(),
        )
        .into());
    }
    let written = storage
        .write(&object_path, body.into_data_stream().boxed())
        .await?;
    info!(object = %object_path, bytes = written, "upload accepted");

    Ok(StatusCode::NO_CONTENT)
}

/// Stream an object to the client.
///
/// Mounted at the root (`/objects/{*path}`) so persisted canonical paths
/// dereference directly. Header metadata comes from the stored object; the
/// body is a streaming pass-through.
pub async fn download_object(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    let storage = state.registry.storage().await?;
    let object_path = format!("/objects/{path}");
    let download = storage.open_download(&object_path).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, download.content_type)
        .header(header::CONTENT_LENGTH, download.content_length)
        .header(header::CACHE_CONTROL, download.cache_control)
        .body(Body::from_stream(download.stream))
        .map_err(|e| AppError::Internal(e.to_string()).into())
}
