//! Database layer: one query-capable handle over two connection
//! strategies.
//!
//! Business logic is provider-blind; it asks the registry for the adapter
//! and gets back a `sea_orm::DatabaseConnection` regardless of whether the
//! deployment runs through a transaction-pooling proxy or straight TCP.

mod adapter;

pub use adapter::{DatabaseAdapter, DatabaseProvider, DbAdapterError};
