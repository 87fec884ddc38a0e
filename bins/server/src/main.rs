//! Trackline API Server
//!
//! Main entry point for the Trackline backend service.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trackline_api::{AdapterRegistry, AppState, create_router};
use trackline_shared::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trackline=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration; a missing required setting aborts startup here
    // with a message naming it.
    let config = AppConfig::load().expect("Failed to load configuration");
    let addr = format!("{}:{}", config.server.host, config.server.port);

    // The registry owns the adapter singletons for the whole process.
    let registry = Arc::new(AdapterRegistry::new(config));
    registry.init_database().await?;
    info!("Connected to database");

    // Build the storage adapter eagerly so provider misconfiguration or a
    // dead credential broker aborts startup instead of the first upload.
    let storage = registry.storage().await?;
    info!(provider = storage.provider_name(), "Storage adapter ready");

    let state = AppState {
        registry: Arc::clone(&registry),
    };
    let app = create_router(state);

    // Start server
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    registry.shutdown().await;
    info!("Adapters closed, goodbye");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received");
}
