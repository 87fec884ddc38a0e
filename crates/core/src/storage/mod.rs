//! Blob storage adapter using Apache OpenDAL.
//!
//! One interface over two backend strategies:
//! - Federated cloud object storage: no static secrets, the adapter
//!   exchanges a local identity assertion with a credential broker for a
//!   short-lived session and signs URLs with it
//! - Local filesystem (development): same operations over a root directory,
//!   with uploads mediated by the application's own PUT endpoint
//!
//! Callers only ever see canonical `/objects/...` paths; provider hosts,
//! buckets and private-root prefixes never leave this module except inside
//! transient signed URLs.

mod adapter;
mod config;
mod error;

pub use adapter::{ObjectDownload, ObjectEntry, StorageAdapter, UploadTicket};
pub use config::{StorageConfig, StorageProvider};
pub use error::StorageError;
