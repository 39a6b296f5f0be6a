//! Cache Entry Module
//!
//! Defines individual cache entries, their lifecycle state and the builder
//! context used to attach expiration triggers while an entry is being created.

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cache::{ExpirationTrigger, TriggerRegistration};

// == Entry State ==
/// Lifecycle of a cache entry: `Building -> Live -> Evicted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryState {
    /// Created by `set`, not yet visible in the store
    Building = 0,
    /// Committed and reachable by key
    Live = 1,
    /// Removed from the store with every registration released
    Evicted = 2,
}

impl EntryState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => EntryState::Building,
            1 => EntryState::Live,
            _ => EntryState::Evicted,
        }
    }
}

// == Trigger Slot ==
/// A trigger together with the activeness it reported at commit time.
pub(crate) struct TriggerSlot {
    pub(crate) trigger: Arc<dyn ExpirationTrigger>,
    pub(crate) active: bool,
}

// == Cache Entry ==
/// Represents a single cache entry with its triggers and registrations.
pub struct CacheEntry<K, V> {
    key: K,
    value: V,
    triggers: Vec<TriggerSlot>,
    registrations: Mutex<Vec<TriggerRegistration>>,
    state: AtomicU8,
}

impl<K, V> CacheEntry<K, V> {
    // == Constructor ==
    /// Creates an entry in the `Building` state.
    pub(crate) fn new(key: K, value: V, triggers: Vec<TriggerSlot>) -> Self {
        Self {
            key,
            value,
            triggers,
            registrations: Mutex::new(Vec::new()),
            state: AtomicU8::new(EntryState::Building as u8),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn state(&self) -> EntryState {
        EntryState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Number of triggers attached to this entry.
    pub fn trigger_count(&self) -> usize {
        self.triggers.len()
    }

    /// Number of registrations not yet released.
    pub fn registration_count(&self) -> usize {
        self.lock_registrations().len()
    }

    // == Commit ==
    /// Moves the entry from `Building` to `Live`.
    ///
    /// Fails when an active trigger already fired during registration, in
    /// which case the entry must not be installed.
    pub(crate) fn commit(&self) -> bool {
        self.state
            .compare_exchange(
                EntryState::Building as u8,
                EntryState::Live as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    // == Mark Evicted ==
    /// Claims the eviction of this entry.
    ///
    /// Returns the state the entry was in, or `None` if another caller already
    /// evicted it. Exactly one caller ever gets `Some`.
    pub(crate) fn mark_evicted(&self) -> Option<EntryState> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == EntryState::Evicted as u8 {
                return None;
            }
            match self.state.compare_exchange_weak(
                current,
                EntryState::Evicted as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(previous) => return Some(EntryState::from_u8(previous)),
                Err(actual) => current = actual,
            }
        }
    }

    // == Registrations ==
    /// Takes ownership of a registration for one of this entry's active triggers.
    ///
    /// If the entry was evicted in the meantime the registration is released
    /// right away instead of being kept.
    pub(crate) fn add_registration(&self, registration: TriggerRegistration) {
        let mut registrations = self.lock_registrations();
        if self.state() == EntryState::Evicted {
            drop(registrations);
            registration.dispose();
            return;
        }
        registrations.push(registration);
    }

    /// Releases every registration owned by this entry.
    pub(crate) fn release_registrations(&self) {
        let released = mem::take(&mut *self.lock_registrations());
        for registration in &released {
            registration.dispose();
        }
    }

    fn lock_registrations(&self) -> MutexGuard<'_, Vec<TriggerRegistration>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // == Trigger Evaluation ==
    /// Polls the lazy triggers of this entry.
    ///
    /// Active triggers are not consulted: they report through their callback.
    pub fn has_expired_lazy_trigger(&self) -> bool {
        self.triggers
            .iter()
            .filter(|slot| !slot.active)
            .any(|slot| slot.trigger.is_expired())
    }

    pub(crate) fn active_triggers(&self) -> impl Iterator<Item = &Arc<dyn ExpirationTrigger>> {
        self.triggers
            .iter()
            .filter(|slot| slot.active)
            .map(|slot| &slot.trigger)
    }
}

impl<K: fmt::Debug, V> fmt::Debug for CacheEntry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("state", &self.state())
            .field("triggers", &self.triggers.len())
            .field("registrations", &self.registration_count())
            .finish()
    }
}

// == Entry Builder Context ==
/// Handed to the value factory of `MemoryCache::set` to attach triggers to the
/// entry under construction.
#[derive(Default)]
pub struct EntryBuilderContext {
    triggers: Vec<Arc<dyn ExpirationTrigger>>,
}

impl EntryBuilderContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Attaches an expiration trigger to the entry being built.
    pub fn add_expiration_trigger(&mut self, trigger: Arc<dyn ExpirationTrigger>) {
        self.triggers.push(trigger);
    }

    /// Number of triggers attached so far.
    pub fn trigger_count(&self) -> usize {
        self.triggers.len()
    }

    pub(crate) fn into_triggers(self) -> Vec<Arc<dyn ExpirationTrigger>> {
        self.triggers
    }
}

impl fmt::Debug for EntryBuilderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryBuilderContext")
            .field("triggers", &self.triggers.len())
            .finish()
    }
}
