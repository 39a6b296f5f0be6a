//! Shared test doubles for cache integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use trigger_cache::cache::{CallbackState, Disposable, ExpirationCallback, ExpirationTrigger};

/// Subscription handed out by [`TestTrigger`], counting its disposals.
pub struct TestRegistration {
    callback: ExpirationCallback,
    state: CallbackState,
    disposals: AtomicUsize,
}

impl TestRegistration {
    pub fn is_disposed(&self) -> bool {
        self.disposals() > 0
    }

    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }

    fn invoke(&self) {
        (self.callback)(&self.state);
    }

    /// Invokes the registered callback with state it was not registered with.
    pub fn invoke_with(&self, state: &CallbackState) {
        (self.callback)(state);
    }
}

impl Disposable for TestRegistration {
    fn dispose(&self) {
        self.disposals.fetch_add(1, Ordering::SeqCst);
    }
}

/// Trigger whose answers are set by the test and whose queries are recorded.
#[derive(Default)]
pub struct TestTrigger {
    expired: AtomicBool,
    active: AtomicBool,
    is_expired_calls: AtomicUsize,
    active_calls: AtomicUsize,
    registration: Mutex<Option<Arc<TestRegistration>>>,
    register_calls: AtomicUsize,
}

impl TestTrigger {
    /// Not expired, supports active callbacks.
    pub fn active() -> Arc<Self> {
        let trigger = Self::default();
        trigger.active.store(true, Ordering::SeqCst);
        Arc::new(trigger)
    }

    /// Not expired, must be polled.
    pub fn lazy() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Already expired, must be polled.
    pub fn expired() -> Arc<Self> {
        let trigger = Self::default();
        trigger.expired.store(true, Ordering::SeqCst);
        Arc::new(trigger)
    }

    pub fn set_expired(&self, expired: bool) {
        self.expired.store(expired, Ordering::SeqCst);
    }

    pub fn is_expired_was_called(&self) -> bool {
        self.is_expired_calls() > 0
    }

    pub fn is_expired_calls(&self) -> usize {
        self.is_expired_calls.load(Ordering::SeqCst)
    }

    pub fn active_expiration_callbacks_was_called(&self) -> bool {
        self.active_calls() > 0
    }

    pub fn active_calls(&self) -> usize {
        self.active_calls.load(Ordering::SeqCst)
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn registration(&self) -> Option<Arc<TestRegistration>> {
        self.registration.lock().unwrap().clone()
    }

    /// Marks the trigger expired and invokes the callback unless disposed.
    pub fn fire(&self) {
        self.set_expired(true);
        if let Some(registration) = self.registration() {
            if !registration.is_disposed() {
                registration.invoke();
            }
        }
    }

    /// Invokes the callback even after disposal, like a trigger that does
    /// not honour its release handle.
    pub fn fire_ignoring_disposal(&self) {
        self.set_expired(true);
        if let Some(registration) = self.registration() {
            registration.invoke();
        }
    }
}

impl ExpirationTrigger for TestTrigger {
    fn is_expired(&self) -> bool {
        self.is_expired_calls.fetch_add(1, Ordering::SeqCst);
        self.expired.load(Ordering::SeqCst)
    }

    fn active_expiration_callbacks(&self) -> bool {
        self.active_calls.fetch_add(1, Ordering::SeqCst);
        self.active.load(Ordering::SeqCst)
    }

    fn register_expiration_callback(
        &self,
        callback: ExpirationCallback,
        state: CallbackState,
    ) -> Box<dyn Disposable> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        let registration = Arc::new(TestRegistration {
            callback,
            state,
            disposals: AtomicUsize::new(0),
        });
        *self.registration.lock().unwrap() = Some(registration.clone());
        Box::new(registration)
    }
}

/// Payload with identity, to check the very same value comes back.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Payload(pub u32);
