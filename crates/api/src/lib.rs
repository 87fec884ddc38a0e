//! HTTP API layer for Trackline's resource core.
//!
//! This crate provides:
//! - The adapter registry (process-wide database and storage singletons)
//! - The object endpoints the storage design contractually requires
//! - Error-to-response mapping

pub mod error;
pub mod registry;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use registry::AdapterRegistry;

/// Application state shared across handlers.
///
/// Handlers never hold adapters themselves; they fetch them through the
/// registry on every use, so teardown and rebuild stay in one place.
#[derive(Clone)]
pub struct AppState {
    /// Adapter registry owning the database and storage singletons.
    pub registry: Arc<AdapterRegistry>,
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes())
        // Health and canonical object paths live at the root: `/health` is
        // unversioned, and persisted `/objects/...` references dereference
        // directly.
        .merge(routes::health::routes())
        .route("/objects/{*path}", get(routes::objects::download_object))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
