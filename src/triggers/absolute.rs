//! Absolute Expiration Trigger
//!
//! Lazy, time-based trigger that expires at a fixed instant.

use std::time::{Duration, Instant};

use crate::cache::ExpirationTrigger;

// == Absolute Expiration ==
/// Expires once the current time reaches a fixed deadline.
///
/// This trigger does not call back: entries carrying it are evicted when
/// read, or by the periodic scan, after the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsoluteExpiration {
    expires_at: Instant,
}

impl AbsoluteExpiration {
    // == Constructors ==
    /// Expires at `expires_at`.
    pub fn at(expires_at: Instant) -> Self {
        Self { expires_at }
    }

    /// Expires `ttl` from now.
    ///
    /// # Panics
    /// When the deadline is not representable as an `Instant`. Use
    /// [`checked_after`](Self::checked_after) for untrusted durations.
    pub fn after(ttl: Duration) -> Self {
        Self::at(Instant::now() + ttl)
    }

    /// Expires `ttl` from now, or `None` when the deadline lies beyond what
    /// an `Instant` can represent, which amounts to never expiring.
    pub fn checked_after(ttl: Duration) -> Option<Self> {
        Instant::now().checked_add(ttl).map(Self::at)
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    // == Remaining ==
    /// Time left before expiration, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

impl ExpirationTrigger for AbsoluteExpiration {
    /// Expired when the current time is greater than or equal to the deadline.
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    fn active_expiration_callbacks(&self) -> bool {
        false
    }
}
