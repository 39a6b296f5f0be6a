//! Expiration Triggers
//!
//! Ready-made trigger implementations.
//!
//! # Triggers
//! - `AbsoluteExpiration`: lazy, expires at a fixed instant
//! - `CancellationTrigger`: active, expires when fired by its owner

mod absolute;
mod cancellation;

pub use absolute::AbsoluteExpiration;
pub use cancellation::CancellationTrigger;
