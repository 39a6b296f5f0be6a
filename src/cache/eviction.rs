//! Eviction Events
//!
//! Reasons an entry leaves the store and the listener hook used to observe them.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

// == Eviction Reason ==
/// Why an entry was evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    /// Explicit `remove` (or `clear`)
    Removed,
    /// Superseded by a `set` under the same key
    Replaced,
    /// A lazy trigger reported expired when checked
    Expired,
    /// An active trigger invoked its callback
    TriggerFired,
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvictionReason::Removed => "removed",
            EvictionReason::Replaced => "replaced",
            EvictionReason::Expired => "expired",
            EvictionReason::TriggerFired => "trigger_fired",
        };
        f.write_str(name)
    }
}

// == Eviction Listener ==
/// Observer invoked once for every entry that leaves the store.
///
/// Runs on the thread performing the eviction, with no cache lock held. That
/// thread may be a trigger's own callback thread.
pub type EvictionListener<K> = Arc<dyn Fn(&K, EvictionReason) + Send + Sync>;
