//! Shared configuration and error types for Trackline.
//!
//! This crate provides common types used across all other crates:
//! - Deployment configuration (database + storage provider selection)
//! - Application-wide error taxonomy

pub mod config;
pub mod error;

pub use config::{AppConfig, DatabaseSettings, StorageSettings};
pub use error::{AppError, AppResult};
