//! Pluggable backend resource layer for Trackline.
//!
//! This crate contains the provider-agnostic pieces of the stack with ZERO
//! web or database dependencies:
//!
//! - `storage` - Blob storage adapter (federated cloud or local filesystem)
//! - `objectref` - Pure translation rules between object reference forms

pub mod objectref;
pub mod storage;
