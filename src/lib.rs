//! courier-sync: remote order fulfillment synchronization engine.
//!
//! Keeps locally-owned delivery orders consistent with their third-party
//! commerce counterparts: durable retryable sync tasks, an idempotent
//! fulfillment algorithm, and signed webhook ingestion.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod notify;
pub mod shopify;
pub mod state;
pub mod store;
pub mod sync;
pub mod util;
