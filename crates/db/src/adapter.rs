//! Database adapter implementation.

use std::str::FromStr;
use std::time::Duration;

use sea_orm::{DatabaseConnection, SqlxPostgresConnector};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;
use trackline_shared::{AppError, DatabaseSettings};

/// Client-side pool cap for the pooled proxy strategy. The proxy
/// multiplexes server connections itself; a large client pool only wastes
/// proxy slots.
const EDGE_POOL_MAX: u32 = 4;

/// Database adapter errors.
#[derive(Debug, Error)]
pub enum DbAdapterError {
    /// Missing or invalid required setting.
    #[error("database configuration error: {0}")]
    Configuration(String),

    /// Operation attempted before connect or after disconnect.
    #[error("database adapter is not connected")]
    NotConnected,

    /// The underlying database rejected or failed the operation.
    #[error("database provider error: {0}")]
    Provider(#[from] sqlx::Error),
}

impl From<DbAdapterError> for AppError {
    fn from(err: DbAdapterError) -> Self {
        match err {
            DbAdapterError::Configuration(msg) => Self::Configuration(msg),
            DbAdapterError::NotConnected => Self::NotConnected("database adapter".to_string()),
            DbAdapterError::Provider(e) => Self::Provider(e.to_string()),
        }
    }
}

/// Connection strategy selector.
///
/// Both strategies hand back the same query-capable
/// `sea_orm::DatabaseConnection`, so call sites never branch on the
/// provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseProvider {
    /// Transaction-pooling proxy endpoint: small client pool, no prepared
    /// statement cache (the proxy hands each transaction a different
    /// server connection).
    EdgePooled,
    /// Direct Postgres over TCP: full-size pool, default statement cache.
    DirectTcp,
}

impl DatabaseProvider {
    /// Resolve the selector string from configuration.
    ///
    /// A missing selector takes the documented default (`edge-pooled`); an
    /// unrecognized value is a configuration error, never a silent
    /// fallback.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for unknown selector values.
    pub fn from_selector(selector: Option<&str>) -> Result<Self, DbAdapterError> {
        match selector {
            None => Ok(Self::EdgePooled),
            Some("edge-pooled") => Ok(Self::EdgePooled),
            Some("direct-tcp") => Ok(Self::DirectTcp),
            Some(other) => Err(DbAdapterError::Configuration(format!(
                "unknown database provider '{other}'"
            ))),
        }
    }

    /// Provider name for logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::EdgePooled => "edge-pooled",
            Self::DirectTcp => "direct-tcp",
        }
    }
}

struct PoolState {
    pool: PgPool,
    conn: DatabaseConnection,
}

/// Database adapter owning the connection pool lifecycle.
///
/// One instance per process, owned by the registry. `connect` and
/// `disconnect` are safe to call concurrently with in-flight `client`
/// calls; an operation that loses the race observes `NotConnected`.
pub struct DatabaseAdapter {
    provider: DatabaseProvider,
    settings: DatabaseSettings,
    state: RwLock<Option<PoolState>>,
}

impl std::fmt::Debug for DatabaseAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseAdapter")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl DatabaseAdapter {
    /// Build the adapter from configuration without opening connections.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the selector is unknown or the URL is
    /// missing.
    pub fn from_settings(settings: &DatabaseSettings) -> Result<Self, DbAdapterError> {
        let provider = DatabaseProvider::from_selector(settings.provider.as_deref())?;
        if settings.url.trim().is_empty() {
            return Err(DbAdapterError::Configuration(
                "database.url is required".to_string(),
            ));
        }
        Ok(Self {
            provider,
            settings: settings.clone(),
            state: RwLock::new(None),
        })
    }

    /// Open the connection pool.
    ///
    /// Idempotent: connecting while already connected is a no-op. No
    /// retries happen at this layer; transient failures propagate to the
    /// caller.
    ///
    /// # Errors
    ///
    /// Returns `Provider` if the database is unreachable or rejects the
    /// connection.
    pub async fn connect(&self) -> Result<(), DbAdapterError> {
        let mut state = self.state.write().await;
        if state.is_some() {
            return Ok(());
        }

        let options = PgConnectOptions::from_str(&self.settings.url)?;
        let (options, max_connections, min_connections) = match self.provider {
            DatabaseProvider::EdgePooled => (
                options.statement_cache_capacity(0),
                self.settings.max_connections.min(EDGE_POOL_MAX),
                0,
            ),
            DatabaseProvider::DirectTcp => (
                options,
                self.settings.max_connections,
                self.settings.min_connections,
            ),
        };

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(self.settings.connect_timeout_secs))
            .connect_with(options)
            .await?;
        let conn = SqlxPostgresConnector::from_sqlx_postgres_pool(pool.clone());

        info!(
            provider = self.provider.name(),
            max_connections, "database connected"
        );
        *state = Some(PoolState { pool, conn });
        Ok(())
    }

    /// Close the pool and clear internal state.
    ///
    /// Safe to call when not connected (no-op). A later `connect` rebuilds
    /// cleanly. In-flight operations racing this call fail with
    /// `NotConnected`, which is the expected outcome during teardown.
    pub async fn disconnect(&self) {
        let mut state = self.state.write().await;
        if let Some(old) = state.take() {
            old.pool.close().await;
            info!(provider = self.provider.name(), "database disconnected");
        }
    }

    /// Get a query-capable handle.
    ///
    /// The handle is a cheap clone over the shared pool; it stays valid for
    /// the duration of the queries issued on it.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` before `connect` or after `disconnect`.
    pub async fn client(&self) -> Result<DatabaseConnection, DbAdapterError> {
        self.state
            .read()
            .await
            .as_ref()
            .map(|s| s.conn.clone())
            .ok_or(DbAdapterError::NotConnected)
    }

    /// The selected connection strategy.
    #[must_use]
    pub const fn provider(&self) -> DatabaseProvider {
        self.provider
    }

    /// Whether the pool is currently open.
    pub async fn is_connected(&self) -> bool {
        self.state.read().await.is_some()
    }
}
