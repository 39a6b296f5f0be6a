//! Tag Triggers
//!
//! Maps invalidation tags to shared cancellation triggers.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::triggers::CancellationTrigger;

/// Registry of one `CancellationTrigger` per tag.
///
/// Invalidating a tag fires its trigger and forgets it, so the next entry
/// stored under that tag gets a fresh trigger.
#[derive(Debug, Clone, Default)]
pub struct TagTriggers {
    triggers: Arc<DashMap<String, CancellationTrigger>>,
}

impl TagTriggers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the trigger for `tag`, creating it on first use.
    pub fn trigger_for(&self, tag: &str) -> CancellationTrigger {
        if let Some(trigger) = self.triggers.get(tag) {
            return trigger.value().clone();
        }
        self.triggers
            .entry(tag.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Fires and forgets the trigger for `tag`.
    ///
    /// Returns the number of entries notified, or `None` for an unknown tag.
    pub fn invalidate(&self, tag: &str) -> Option<usize> {
        let (_, trigger) = self.triggers.remove(tag)?;
        let notified = trigger.fire();
        info!(tag, notified, "Invalidated tag");
        Some(notified)
    }

    // == Prune ==
    /// Forgets every tag whose trigger is referenced by nothing but this
    /// registry, meaning no cached entry carries it any more.
    ///
    /// A handle given out by `trigger_for` counts as a reference, so a tag
    /// about to be attached to a new entry is kept. Returns the number of
    /// tags forgotten.
    pub fn prune(&self) -> usize {
        let before = self.triggers.len();
        self.triggers.retain(|_, trigger| trigger.handle_count() > 1);
        let pruned = before.saturating_sub(self.triggers.len());
        if pruned > 0 {
            debug!(pruned, "Pruned unused tags");
        }
        pruned
    }

    /// Number of tags with a live trigger.
    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }
}
