//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::debug;

use crate::api::TagTriggers;
use crate::cache::MemoryCache;
use crate::error::{CacheError, Result};
use crate::models::{
    DeleteResponse, GetResponse, HealthResponse, InvalidateResponse, SetRequest, SetResponse,
    StatsResponse,
};
use crate::triggers::AbsoluteExpiration;

/// Application state shared across all handlers.
///
/// The cache synchronizes internally, so handlers share it through a plain `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Shared cache store
    pub cache: Arc<MemoryCache<String, String>>,
    /// Invalidation tags
    pub tags: TagTriggers,
    /// TTL applied when a request does not carry one
    pub default_ttl: Option<Duration>,
}

impl AppState {
    /// Creates a new AppState with the given cache and no default TTL.
    pub fn new(cache: MemoryCache<String, String>) -> Self {
        Self {
            cache: Arc::new(cache),
            tags: TagTriggers::new(),
            default_ttl: None,
        }
    }

    /// Runs one maintenance pass: evicts entries with expired lazy triggers,
    /// then forgets tags no live entry carries.
    ///
    /// Returns the number of entries evicted and of tags pruned.
    pub fn sweep(&self) -> (usize, usize) {
        let expired = self.cache.remove_expired();
        let pruned = self.tags.prune();
        (expired, pruned)
    }

    /// Creates a new AppState from configuration.
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(MemoryCache::new()).with_default_ttl(config.default_ttl())
    }

    pub fn with_default_ttl(mut self, default_ttl: Option<Duration>) -> Self {
        self.default_ttl = default_ttl;
        self
    }
}

/// Handler for PUT /set
///
/// Stores a key-value pair, expiring after its TTL or when one of its tags
/// is invalidated.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    // Validate request
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let ttl = req.ttl.map(Duration::from_secs).or(state.default_ttl);
    // A deadline past the end of `Instant` never comes.
    let deadline = ttl.and_then(|ttl| {
        let deadline = AbsoluteExpiration::checked_after(ttl);
        if deadline.is_none() {
            debug!(
                ttl_secs = ttl.as_secs(),
                "TTL out of range, storing without expiration"
            );
        }
        deadline
    });
    let tags = &req.tags;
    let value = req.value;

    state.cache.set(req.key.clone(), |context| {
        if let Some(deadline) = deadline {
            context.add_expiration_trigger(Arc::new(deadline));
        }
        for tag in tags {
            context.add_expiration_trigger(Arc::new(state.tags.trigger_for(tag)));
        }
        value
    });

    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for GET /get/:key
///
/// Retrieves a value from the cache by key.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    match state.cache.get(&key) {
        Some(value) => Ok(Json(GetResponse::new(key, value))),
        None => Err(CacheError::NotFound(key)),
    }
}

/// Handler for DELETE /del/:key
///
/// Deletes a key from the cache.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    if state.cache.remove(&key) {
        Ok(Json(DeleteResponse::new(key)))
    } else {
        Err(CacheError::NotFound(key))
    }
}

/// Handler for POST /invalidate/:tag
///
/// Fires the tag's trigger, evicting every entry stored with that tag.
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Result<Json<InvalidateResponse>> {
    match state.tags.invalidate(&tag) {
        Some(evicted) => Ok(Json(InvalidateResponse::new(tag, evicted))),
        None => Err(CacheError::NotFound(tag)),
    }
}

/// Handler for GET /stats
///
/// Returns current cache statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::from(state.cache.stats()))
}

/// Handler for GET /health
///
/// Returns health status of the server.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
