//! Expiration Trigger Module
//!
//! Defines the capability the cache consumes from trigger implementations and
//! the scoped registration handle the cache keeps for every active trigger.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// == Callback Types ==
/// Opaque state handed back to an expiration callback when it fires.
pub type CallbackState = Arc<dyn Any + Send + Sync>;

/// Function invoked by an active trigger, together with the state it was
/// registered with.
pub type ExpirationCallback = fn(&CallbackState);

// == Disposable ==
/// A release handle returned by `register_expiration_callback`.
///
/// After `dispose` returns, the trigger should no longer invoke the callback.
/// Triggers that cannot guarantee this are tolerated: the cache absorbs late
/// or repeated callbacks.
pub trait Disposable: Send + Sync {
    fn dispose(&self);
}

impl<T: Disposable + ?Sized> Disposable for Arc<T> {
    fn dispose(&self) {
        (**self).dispose()
    }
}

/// Release handle that has nothing to release.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyDisposable;

impl Disposable for EmptyDisposable {
    fn dispose(&self) {}
}

// == Expiration Trigger ==
/// A condition that, once it occurs, invalidates the entries it is attached to.
///
/// Lazy triggers answer `false` from `active_expiration_callbacks` and are
/// polled through `is_expired` whenever their entry is read. Active triggers
/// answer `true` and are expected to call back into the cache on their own.
pub trait ExpirationTrigger: Send + Sync {
    /// Whether the condition has already occurred.
    fn is_expired(&self) -> bool;

    /// Whether this trigger can proactively invoke a registered callback.
    fn active_expiration_callbacks(&self) -> bool;

    /// Subscribes `callback` to be invoked with `state` when the trigger fires.
    ///
    /// Only called for triggers reporting active callback support.
    fn register_expiration_callback(
        &self,
        callback: ExpirationCallback,
        state: CallbackState,
    ) -> Box<dyn Disposable> {
        let _ = (callback, state);
        Box::new(EmptyDisposable)
    }
}

// == Trigger Registration ==
/// Owned subscription to an active trigger.
///
/// Releasing is idempotent: the underlying handle is disposed at most once,
/// either through `dispose` or when the registration is dropped.
pub struct TriggerRegistration {
    handle: Box<dyn Disposable>,
    disposed: AtomicBool,
}

impl TriggerRegistration {
    pub(crate) fn new(handle: Box<dyn Disposable>) -> Self {
        Self {
            handle,
            disposed: AtomicBool::new(false),
        }
    }

    /// Releases the subscription. Calls after the first are no-ops.
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            self.handle.dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl Drop for TriggerRegistration {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for TriggerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerRegistration")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
