//! Cache Module
//!
//! Provides an in-memory cache whose entries are invalidated by pluggable
//! expiration triggers, either polled on access or firing on their own.

mod entry;
mod eviction;
mod stats;
mod store;
mod trigger;


// Re-export public types
pub use entry::{CacheEntry, EntryBuilderContext, EntryState};
pub use eviction::{EvictionListener, EvictionReason};
pub use stats::CacheStats;
pub use store::MemoryCache;
pub use trigger::{
    CallbackState, Disposable, EmptyDisposable, ExpirationCallback, ExpirationTrigger,
    TriggerRegistration,
};
