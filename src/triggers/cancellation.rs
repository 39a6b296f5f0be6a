//! Cancellation Trigger
//!
//! Active trigger fired explicitly by its owner. A single token can be
//! attached to any number of entries, which makes it usable as a dependency
//! or tag: firing it evicts every entry that carries it.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::trace;

use crate::cache::{CallbackState, Disposable, EmptyDisposable, ExpirationCallback, ExpirationTrigger};

type Callbacks = HashMap<u64, (ExpirationCallback, CallbackState)>;

#[derive(Default)]
struct TokenState {
    fired: AtomicBool,
    next_id: AtomicU64,
    callbacks: Mutex<Callbacks>,
}

impl TokenState {
    fn lock_callbacks(&self) -> MutexGuard<'_, Callbacks> {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// == Cancellation Trigger ==
/// Shared token that invokes every registered callback when fired.
///
/// Clones refer to the same token.
#[derive(Clone, Default)]
pub struct CancellationTrigger {
    state: Arc<TokenState>,
}

impl CancellationTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    // == Fire ==
    /// Marks the token fired and invokes every registered callback once.
    ///
    /// Callbacks run on the calling thread after the token's lock is released.
    /// Returns the number of callbacks invoked. Firing again is a no-op.
    pub fn fire(&self) -> usize {
        let pending: Vec<_> = {
            let mut callbacks = self.state.lock_callbacks();
            self.state.fired.store(true, Ordering::Release);
            callbacks.drain().map(|(_, callback)| callback).collect()
        };

        trace!(callbacks = pending.len(), "Firing cancellation trigger");
        for (callback, state) in &pending {
            callback(state);
        }
        pending.len()
    }

    pub fn is_fired(&self) -> bool {
        self.state.fired.load(Ordering::Acquire)
    }

    /// Number of handles sharing this token, this one included.
    ///
    /// Entries keep a handle to each of their triggers, so a count of one
    /// means nothing but the caller refers to the token.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.state)
    }

    /// Number of callbacks currently waiting for this token.
    pub fn registered_callbacks(&self) -> usize {
        self.state.lock_callbacks().len()
    }
}

impl ExpirationTrigger for CancellationTrigger {
    fn is_expired(&self) -> bool {
        self.is_fired()
    }

    fn active_expiration_callbacks(&self) -> bool {
        true
    }

    /// Registering on a token that already fired invokes the callback
    /// immediately.
    fn register_expiration_callback(
        &self,
        callback: ExpirationCallback,
        state: CallbackState,
    ) -> Box<dyn Disposable> {
        let mut callbacks = self.state.lock_callbacks();
        if self.is_fired() {
            drop(callbacks);
            callback(&state);
            return Box::new(EmptyDisposable);
        }

        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
        callbacks.insert(id, (callback, state));
        Box::new(CallbackRelease {
            id,
            token: Arc::downgrade(&self.state),
        })
    }
}

impl fmt::Debug for CancellationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationTrigger")
            .field("fired", &self.is_fired())
            .field("callbacks", &self.registered_callbacks())
            .finish()
    }
}

// == Callback Release ==
/// Removes one callback from its token.
struct CallbackRelease {
    id: u64,
    token: Weak<TokenState>,
}

impl Disposable for CallbackRelease {
    fn dispose(&self) {
        if let Some(token) = self.token.upgrade() {
            token.lock_callbacks().remove(&self.id);
        }
    }
}
