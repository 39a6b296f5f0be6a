//! Cache Store Module
//!
//! Concurrent key to entry mapping with trigger-driven eviction.
//!
//! Entries leave the store through four paths: explicit `remove`, a newer
//! `set` under the same key, a lazy trigger found expired on access, and an
//! active trigger invoking its callback. All of them funnel into a single
//! eviction routine that claims the entry with an atomic state transition, so
//! an entry is evicted once and its registrations are released once no matter
//! how many paths race for it.

use std::borrow::Borrow;
use std::convert::Infallible;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace, warn};

use crate::cache::entry::TriggerSlot;
use crate::cache::stats::StatsCounters;
use crate::cache::{
    CacheEntry, CacheStats, CallbackState, EntryBuilderContext, EntryState, EvictionListener,
    EvictionReason, TriggerRegistration,
};

// == Store Internals ==
struct StoreInner<K, V> {
    entries: DashMap<K, Arc<CacheEntry<K, V>>>,
    stats: StatsCounters,
    listener: Option<EvictionListener<K>>,
}

/// State registered with active triggers: enough to find and evict one entry.
struct EvictionTarget<K, V> {
    store: Weak<StoreInner<K, V>>,
    entry: Weak<CacheEntry<K, V>>,
}

impl<K, V> StoreInner<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // == Evict Entry ==
    /// Evicts `entry`, removing it from the map only if the key still maps to
    /// this exact instance.
    ///
    /// Returns `true` when this call performed the eviction of a visible entry.
    fn evict_entry(&self, entry: &Arc<CacheEntry<K, V>>, reason: EvictionReason) -> bool {
        let Some(previous) = entry.mark_evicted() else {
            return false;
        };
        self.entries
            .remove_if(entry.key(), |_, current| Arc::ptr_eq(current, entry));
        self.finish_eviction(entry, previous, reason)
    }

    /// Completes the eviction of an entry already taken out of the map.
    fn retire(&self, entry: &Arc<CacheEntry<K, V>>, reason: EvictionReason) -> bool {
        let Some(previous) = entry.mark_evicted() else {
            return false;
        };
        self.finish_eviction(entry, previous, reason)
    }

    fn finish_eviction(
        &self,
        entry: &Arc<CacheEntry<K, V>>,
        previous: EntryState,
        reason: EvictionReason,
    ) -> bool {
        entry.release_registrations();

        // Never visible, nothing to report.
        if previous == EntryState::Building {
            debug!(%reason, "Cache entry expired before commit");
            return false;
        }

        self.stats.record_eviction(reason);
        trace!(%reason, triggers = entry.trigger_count(), "Evicted cache entry");
        if let Some(listener) = &self.listener {
            listener(entry.key(), reason);
        }
        true
    }

    // == Trigger Callback ==
    /// Callback registered with every active trigger.
    fn on_trigger_fired(state: &CallbackState) {
        let Some(target) = state.downcast_ref::<EvictionTarget<K, V>>() else {
            warn!("Expiration callback invoked with foreign state");
            return;
        };
        // Either side gone means the entry is already unreachable.
        let (Some(store), Some(entry)) = (target.store.upgrade(), target.entry.upgrade()) else {
            return;
        };
        store.evict_entry(&entry, EvictionReason::TriggerFired);
    }
}

// == Memory Cache ==
/// Thread-safe in-memory cache with trigger-based expiration.
///
/// Cloning is cheap and yields a handle to the same store.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use trigger_cache::cache::MemoryCache;
/// use trigger_cache::triggers::CancellationTrigger;
///
/// let cache = MemoryCache::new();
/// let token = CancellationTrigger::new();
///
/// cache.set("greeting", |context| {
///     context.add_expiration_trigger(Arc::new(token.clone()));
///     "hello".to_string()
/// });
/// assert_eq!(cache.get("greeting"), Some("hello".to_string()));
///
/// token.fire();
/// assert_eq!(cache.get("greeting"), None);
/// ```
pub struct MemoryCache<K, V> {
    inner: Arc<StoreInner<K, V>>,
}

impl<K, V> MemoryCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::with_listener(None)
    }

    /// Creates an empty cache reporting every eviction to `listener`.
    pub fn with_eviction_listener<F>(listener: F) -> Self
    where
        F: Fn(&K, EvictionReason) + Send + Sync + 'static,
    {
        Self::with_listener(Some(Arc::new(listener)))
    }

    fn with_listener(listener: Option<EvictionListener<K>>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                entries: DashMap::new(),
                stats: StatsCounters::default(),
                listener,
            }),
        }
    }

    // == Set ==
    /// Creates an entry with `factory` and caches it under `key`.
    ///
    /// The factory runs exactly once and may attach expiration triggers
    /// through the context. Its value is always returned, even when one of
    /// the triggers had already expired and the entry was therefore not cached.
    /// An existing entry under the same key is evicted.
    pub fn set<F>(&self, key: K, factory: F) -> V
    where
        F: FnOnce(&mut EntryBuilderContext) -> V,
    {
        match self.try_set(key, |context| Ok::<V, Infallible>(factory(context))) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Like [`set`](Self::set) with a fallible factory.
    ///
    /// When the factory fails nothing is cached and any existing entry under
    /// `key` is left untouched.
    pub fn try_set<E, F>(&self, key: K, factory: F) -> Result<V, E>
    where
        F: FnOnce(&mut EntryBuilderContext) -> Result<V, E>,
    {
        let mut context = EntryBuilderContext::new();
        let value = factory(&mut context)?;
        let triggers = context.into_triggers();

        if triggers.iter().any(|trigger| trigger.is_expired()) {
            debug!(
                triggers = triggers.len(),
                "Not caching entry with an already expired trigger"
            );
            return Ok(value);
        }

        let slots = triggers
            .into_iter()
            .map(|trigger| TriggerSlot {
                active: trigger.active_expiration_callbacks(),
                trigger,
            })
            .collect();

        let entry = Arc::new(CacheEntry::new(key.clone(), value.clone(), slots));
        self.register_active_triggers(&entry);
        self.commit(key, entry);

        Ok(value)
    }

    /// Caches `value` under `key` without any expiration trigger.
    pub fn insert(&self, key: K, value: V) -> V {
        self.set(key, |_| value)
    }

    fn register_active_triggers(&self, entry: &Arc<CacheEntry<K, V>>) {
        for trigger in entry.active_triggers() {
            // A trigger may fire while being registered.
            if entry.state() == EntryState::Evicted {
                break;
            }
            let state: CallbackState = Arc::new(EvictionTarget {
                store: Arc::downgrade(&self.inner),
                entry: Arc::downgrade(entry),
            });
            let handle =
                trigger.register_expiration_callback(StoreInner::<K, V>::on_trigger_fired, state);
            entry.add_registration(TriggerRegistration::new(handle));
        }
    }

    fn commit(&self, key: K, entry: Arc<CacheEntry<K, V>>) {
        // Going live and becoming visible happen under the same shard lock.
        let (committed, previous) = match self.inner.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if entry.commit() {
                    (true, Some(occupied.insert(Arc::clone(&entry))))
                } else {
                    (false, None)
                }
            }
            Entry::Vacant(vacant) => {
                if entry.commit() {
                    vacant.insert(Arc::clone(&entry));
                    (true, None)
                } else {
                    (false, None)
                }
            }
        };

        if !committed {
            return;
        }
        trace!(
            triggers = entry.trigger_count(),
            registrations = entry.registration_count(),
            "Committed cache entry"
        );

        if let Some(previous) = previous {
            self.inner.evict_entry(&previous, EvictionReason::Replaced);
        }
    }

    // == Get ==
    /// Retrieves a value by key.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.try_get_value(key)
    }

    /// Looks up `key`, polling the lazy triggers of the entry found.
    ///
    /// If any of them reports expired the entry is evicted and `None` is
    /// returned. Active triggers are not polled here.
    pub fn try_get_value<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let found = self
            .inner
            .entries
            .get(key)
            .map(|entry| Arc::clone(entry.value()));

        let Some(entry) = found else {
            self.inner.stats.record_miss();
            return None;
        };

        if entry.state() == EntryState::Evicted {
            self.inner.stats.record_miss();
            return None;
        }

        if entry.has_expired_lazy_trigger() {
            self.inner.evict_entry(&entry, EvictionReason::Expired);
            self.inner.stats.record_miss();
            return None;
        }

        self.inner.stats.record_hit();
        Some(entry.value().clone())
    }

    /// Returns the entry stored under `key` without polling its triggers or
    /// touching statistics.
    pub fn peek_entry<Q>(&self, key: &Q) -> Option<Arc<CacheEntry<K, V>>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner
            .entries
            .get(key)
            .map(|entry| Arc::clone(entry.value()))
    }

    // == Remove ==
    /// Evicts the entry under `key`, releasing its trigger registrations.
    ///
    /// Returns `false` when there was nothing to remove or a concurrent
    /// eviction got to the entry first.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.inner.entries.remove(key) {
            Some((_, entry)) => self.inner.retire(&entry, EvictionReason::Removed),
            None => false,
        }
    }

    /// Evicts every entry. Returns the number of entries evicted.
    pub fn clear(&self) -> usize {
        self.snapshot_entries()
            .iter()
            .filter(|entry| self.inner.evict_entry(entry, EvictionReason::Removed))
            .count()
    }

    // == Remove Expired ==
    /// Polls the lazy triggers of every entry and evicts the expired ones.
    ///
    /// Returns the number of entries removed.
    pub fn remove_expired(&self) -> usize {
        self.snapshot_entries()
            .iter()
            .filter(|entry| entry.has_expired_lazy_trigger())
            .filter(|entry| self.inner.evict_entry(entry, EvictionReason::Expired))
            .count()
    }

    fn snapshot_entries(&self) -> Vec<Arc<CacheEntry<K, V>>> {
        self.inner
            .entries
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot(self.len())
    }

    // == Length ==
    /// Returns the current number of entries in the cache.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}

impl<K, V> Default for MemoryCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for MemoryCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> fmt::Debug for MemoryCache<K, V>
where
    K: Hash + Eq,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.inner.entries.len())
            .field("listener", &self.inner.listener.is_some())
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Disposable, ExpirationCallback, ExpirationTrigger};
    use crate::triggers::{AbsoluteExpiration, CancellationTrigger};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread::sleep;
    use std::time::Duration;

    fn tagged(token: &CancellationTrigger) -> Arc<dyn ExpirationTrigger> {
        Arc::new(token.clone())
    }

    /// Active trigger that fires as soon as a callback is registered.
    struct FiresOnRegister {
        disposals: Arc<AtomicUsize>,
    }

    struct CountedRelease(Arc<AtomicUsize>);

    impl Disposable for CountedRelease {
        fn dispose(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl ExpirationTrigger for FiresOnRegister {
        fn is_expired(&self) -> bool {
            false
        }

        fn active_expiration_callbacks(&self) -> bool {
            true
        }

        fn register_expiration_callback(
            &self,
            callback: ExpirationCallback,
            state: CallbackState,
        ) -> Box<dyn Disposable> {
            callback(&state);
            Box::new(CountedRelease(self.disposals.clone()))
        }
    }

    #[test]
    fn test_store_new() {
        let cache: MemoryCache<String, String> = MemoryCache::new();
        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_store_set_and_get() {
        let cache = MemoryCache::new();

        let returned = cache.insert("key1".to_string(), "value1".to_string());

        assert_eq!(returned, "value1");
        assert_eq!(cache.get("key1"), Some("value1".to_string()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let cache: MemoryCache<String, String> = MemoryCache::new();
        assert_eq!(cache.get("nonexistent"), None);
    }

    #[test]
    fn test_store_remove() {
        let cache = MemoryCache::new();
        cache.insert("key1".to_string(), 1);

        assert!(cache.remove("key1"));
        assert!(cache.is_empty());
        assert_eq!(cache.get("key1"), None);
        assert!(!cache.remove("key1"));
    }

    #[test]
    fn test_store_overwrite() {
        let cache = MemoryCache::new();

        cache.insert("key1".to_string(), "value1".to_string());
        cache.insert("key1".to_string(), "value2".to_string());

        assert_eq!(cache.get("key1"), Some("value2".to_string()));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().replaced, 1);
    }

    #[test]
    fn test_factory_invoked_once() {
        let cache = MemoryCache::new();
        let calls = AtomicUsize::new(0);

        let value = cache.set("key", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            42
        });

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_try_set_error_caches_nothing() {
        let cache = MemoryCache::new();
        cache.insert("key", 1);

        let result: Result<i32, &str> = cache.try_set("key", |_| Err("boom"));

        assert_eq!(result, Err("boom"));
        assert_eq!(cache.get("key"), Some(1));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_factory_may_use_the_cache() {
        let cache = MemoryCache::new();
        cache.insert("base", 20);

        let value = cache.set("derived", |_| {
            let base = cache.get("base").unwrap_or_default();
            cache.insert("side", 1);
            base + 1
        });

        assert_eq!(value, 21);
        assert_eq!(cache.get("derived"), Some(21));
        assert_eq!(cache.get("side"), Some(1));
    }

    #[test]
    fn test_absolute_expiration_evicts_on_access() {
        let cache = MemoryCache::new();
        cache.set("key1", |context| {
            context.add_expiration_trigger(Arc::new(AbsoluteExpiration::after(
                Duration::from_millis(50),
            )));
            "value1"
        });

        assert_eq!(cache.get("key1"), Some("value1"));

        sleep(Duration::from_millis(100));

        // Still stored until somebody looks at it.
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("key1"), None);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().expired, 1);
    }

    #[test]
    fn test_cancellation_trigger_evicts() {
        let cache = MemoryCache::new();
        let token = CancellationTrigger::new();
        cache.set("key1", |context| {
            context.add_expiration_trigger(tagged(&token));
            "value1"
        });
        assert_eq!(token.registered_callbacks(), 1);

        token.fire();

        assert!(cache.is_empty());
        assert_eq!(cache.get("key1"), None);
        assert_eq!(token.registered_callbacks(), 0);
        assert_eq!(cache.stats().trigger_fired, 1);
    }

    #[test]
    fn test_shared_trigger_evicts_every_key() {
        let cache = MemoryCache::new();
        let token = CancellationTrigger::new();
        for key in ["a", "b", "c"] {
            cache.set(key, |context| {
                context.add_expiration_trigger(tagged(&token));
                key.len()
            });
        }
        cache.insert("untagged", 0);

        assert_eq!(token.fire(), 3);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("untagged"), Some(0));
    }

    #[test]
    fn test_fired_trigger_is_not_cached() {
        let cache = MemoryCache::new();
        let token = CancellationTrigger::new();
        token.fire();

        let value = cache.set("key", |context| {
            context.add_expiration_trigger(tagged(&token));
            7
        });

        assert_eq!(value, 7);
        assert_eq!(cache.get("key"), None);
        assert_eq!(token.registered_callbacks(), 0);
    }

    #[test]
    fn test_trigger_firing_during_registration_prevents_commit() {
        let evictions = Arc::new(Mutex::new(Vec::new()));
        let seen = evictions.clone();
        let cache = MemoryCache::with_eviction_listener(move |key: &String, reason| {
            seen.lock().unwrap().push((key.clone(), reason));
        });
        let disposals = Arc::new(AtomicUsize::new(0));

        let value = cache.set("key".to_string(), |context| {
            context.add_expiration_trigger(Arc::new(FiresOnRegister {
                disposals: disposals.clone(),
            }));
            "value"
        });

        assert_eq!(value, "value");
        assert_eq!(cache.get("key"), None);
        assert_eq!(disposals.load(Ordering::SeqCst), 1);
        assert!(evictions.lock().unwrap().is_empty());
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_replace_releases_previous_registrations() {
        let cache = MemoryCache::new();
        let first = CancellationTrigger::new();
        let second = CancellationTrigger::new();

        cache.set("key", |context| {
            context.add_expiration_trigger(tagged(&first));
            1
        });
        cache.set("key", |context| {
            context.add_expiration_trigger(tagged(&second));
            2
        });

        assert_eq!(first.registered_callbacks(), 0);
        assert_eq!(second.registered_callbacks(), 1);

        // The superseded entry's trigger no longer affects the key.
        first.fire();
        assert_eq!(cache.get("key"), Some(2));
    }

    #[test]
    fn test_remove_releases_registrations() {
        let cache = MemoryCache::new();
        let token = CancellationTrigger::new();
        cache.set("key", |context| {
            context.add_expiration_trigger(tagged(&token));
            1
        });
        let entry = cache.peek_entry("key").unwrap();
        assert_eq!(entry.registration_count(), 1);

        assert!(cache.remove("key"));

        assert_eq!(entry.state(), EntryState::Evicted);
        assert_eq!(entry.registration_count(), 0);
        assert_eq!(token.registered_callbacks(), 0);
        assert_eq!(token.fire(), 0);
    }

    #[test]
    fn test_eviction_listener_reports_reasons() {
        let evictions = Arc::new(Mutex::new(Vec::new()));
        let seen = evictions.clone();
        let cache = MemoryCache::with_eviction_listener(move |key: &String, reason| {
            seen.lock().unwrap().push((key.clone(), reason));
        });
        let token = CancellationTrigger::new();

        cache.insert("removed".to_string(), 1);
        cache.remove("removed");

        cache.insert("replaced".to_string(), 1);
        cache.insert("replaced".to_string(), 2);

        cache.set("fired".to_string(), |context| {
            context.add_expiration_trigger(tagged(&token));
            3
        });
        token.fire();

        cache.set("expired".to_string(), |context| {
            context.add_expiration_trigger(Arc::new(AbsoluteExpiration::after(
                Duration::from_millis(10),
            )));
            4
        });
        sleep(Duration::from_millis(30));
        assert_eq!(cache.get("expired"), None);

        let evictions = evictions.lock().unwrap();
        assert_eq!(
            *evictions,
            vec![
                ("removed".to_string(), EvictionReason::Removed),
                ("replaced".to_string(), EvictionReason::Replaced),
                ("fired".to_string(), EvictionReason::TriggerFired),
                ("expired".to_string(), EvictionReason::Expired),
            ]
        );
    }

    #[test]
    fn test_remove_expired_polls_lazy_triggers() {
        let cache = MemoryCache::new();
        let token = CancellationTrigger::new();

        cache.set("short", |context| {
            context.add_expiration_trigger(Arc::new(AbsoluteExpiration::after(
                Duration::from_millis(10),
            )));
            1
        });
        cache.set("long", |context| {
            context.add_expiration_trigger(Arc::new(AbsoluteExpiration::after(
                Duration::from_secs(60),
            )));
            2
        });
        cache.set("active", |context| {
            context.add_expiration_trigger(tagged(&token));
            3
        });

        sleep(Duration::from_millis(30));

        assert_eq!(cache.remove_expired(), 1);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("long"), Some(2));
        assert_eq!(cache.get("active"), Some(3));
    }

    #[test]
    fn test_clear() {
        let cache = MemoryCache::new();
        let token = CancellationTrigger::new();
        cache.insert("a", 1);
        cache.set("b", |context| {
            context.add_expiration_trigger(tagged(&token));
            2
        });

        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
        assert_eq!(token.registered_callbacks(), 0);
        assert_eq!(cache.stats().removed, 2);
    }

    #[test]
    fn test_store_stats() {
        let cache = MemoryCache::new();

        cache.insert("key1", 1);
        cache.get("key1"); // hit
        cache.get("nonexistent"); // miss

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_entries, 1);
    }

    #[test]
    fn test_clones_share_the_store() {
        let cache = MemoryCache::new();
        let handle = cache.clone();

        handle.insert("key", 1);

        assert_eq!(cache.get("key"), Some(1));
    }

    #[test]
    fn test_callback_after_store_dropped_is_ignored() {
        let token = CancellationTrigger::new();
        {
            let cache = MemoryCache::new();
            cache.set("key", |context| {
                context.add_expiration_trigger(tagged(&token));
                1
            });
            // Dropping the store drops the entry, whose registration releases
            // the callback.
        }
        assert_eq!(token.registered_callbacks(), 0);
        assert_eq!(token.fire(), 0);
    }
}
