//! Health check endpoints.
//!
//! Reports which backend strategies the registry selected and whether the
//! database pool is open. The handler never opens connections or triggers
//! a credential exchange; the storage provider is reported from
//! configuration so a dead broker cannot make the health check hang.

use axum::extract::State;
use axum::{Json, Router, routing::get};
use serde::Serialize;

use crate::AppState;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Selected database connection strategy.
    pub database_provider: &'static str,
    /// Whether the database pool is currently open.
    pub database_connected: bool,
    /// Configured storage provider selector.
    pub storage_provider: Option<String>,
}

/// Health check handler.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let (database_provider, database_connected) = match state.registry.database().await {
        Ok(adapter) => (adapter.provider().name(), adapter.is_connected().await),
        Err(_) => ("invalid", false),
    };

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        database_provider,
        database_connected,
        storage_provider: state.registry.config().storage.provider.clone(),
    })
}

/// Creates health check routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
