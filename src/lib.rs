//! Trigger Cache - An in-memory cache with trigger-based expiration
//!
//! Entries are invalidated by pluggable expiration triggers: lazy triggers
//! are polled when an entry is read, active triggers evict their entries
//! themselves by calling back into the cache. A small HTTP server exposes
//! the cache with TTL and tag invalidation.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;
pub mod triggers;

pub use api::AppState;
pub use cache::{EntryBuilderContext, EvictionReason, ExpirationTrigger, MemoryCache};
pub use config::Config;
pub use tasks::spawn_scan_task;
