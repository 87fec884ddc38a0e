//! API route definitions.

use axum::Router;

use crate::AppState;

pub mod health;
pub mod objects;

/// Creates the versioned API router. Health is mounted at the root by
/// `create_router`, not under `/api/v1`.
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(objects::routes())
}
