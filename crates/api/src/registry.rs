//! Adapter registry: one database adapter and one storage adapter per
//! process.
//!
//! The registry is an explicit handle created at startup and shared through
//! `AppState`, not a module-level global. Adapters are built lazily on
//! first access; concurrent first calls serialize on the slot's mutex, so
//! two distinct instances can never be created. An explicit teardown clears
//! a slot, and the next access rebuilds fresh.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use trackline_core::storage::{StorageAdapter, StorageConfig};
use trackline_db::DatabaseAdapter;
use trackline_shared::{AppConfig, AppError};

/// Process-wide adapter registry.
pub struct AdapterRegistry {
    config: AppConfig,
    database: Mutex<Option<Arc<DatabaseAdapter>>>,
    storage: Mutex<Option<Arc<StorageAdapter>>>,
}

impl AdapterRegistry {
    /// Create an empty registry over the resolved configuration.
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            database: Mutex::new(None),
            storage: Mutex::new(None),
        }
    }

    /// Get the database adapter, constructing it on first access.
    ///
    /// Construction validates configuration but does not open connections;
    /// call `init_database` (or `connect` on the adapter) for that.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the database settings are invalid.
    pub async fn database(&self) -> Result<Arc<DatabaseAdapter>, AppError> {
        let mut slot = self.database.lock().await;
        if let Some(adapter) = slot.as_ref() {
            return Ok(Arc::clone(adapter));
        }
        let adapter = Arc::new(DatabaseAdapter::from_settings(&self.config.database)?);
        *slot = Some(Arc::clone(&adapter));
        Ok(adapter)
    }

    /// Construct the database adapter and open its pool.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid settings or a provider
    /// error if the database is unreachable.
    pub async fn init_database(&self) -> Result<(), AppError> {
        let adapter = self.database().await?;
        adapter.connect().await?;
        Ok(())
    }

    /// Disconnect and drop the database adapter. The next access rebuilds
    /// a fresh instance.
    pub async fn close_database(&self) {
        let mut slot = self.database.lock().await;
        if let Some(adapter) = slot.take() {
            adapter.disconnect().await;
            info!("database adapter closed");
        }
    }

    /// Get the storage adapter, constructing and connecting it on first
    /// access.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid settings, or a provider
    /// error if the credential broker is unreachable.
    pub async fn storage(&self) -> Result<Arc<StorageAdapter>, AppError> {
        let mut slot = self.storage.lock().await;
        if let Some(adapter) = slot.as_ref() {
            return Ok(Arc::clone(adapter));
        }
        let storage_config = StorageConfig::from_settings(&self.config.storage)?;
        let adapter = Arc::new(StorageAdapter::connect(storage_config).await?);
        *slot = Some(Arc::clone(&adapter));
        Ok(adapter)
    }

    /// Drop the storage adapter. The next access rebuilds a fresh instance.
    /// Used by test suites and graceful shutdown.
    pub async fn reset_storage(&self) {
        let mut slot = self.storage.lock().await;
        if slot.take().is_some() {
            info!("storage adapter reset");
        }
    }

    /// Tear down both adapters.
    pub async fn shutdown(&self) {
        self.close_database().await;
        self.reset_storage().await;
    }

    /// The configuration this registry was created with.
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
