//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Expiration scan: evicts entries whose lazy triggers have expired, so
//!   entries that are never read again do not linger

mod scan;

pub use scan::{spawn_scan_task, spawn_scan_task_every};
