//! Domain types for the courier pipeline.
//!
//! This module contains the core data structures:
//! - Record: Inbound events, their on-disk form, and listener deliveries
//! - Readiness: Lifecycle states gating delivery

pub mod readiness;
pub mod record;

// Re-export commonly used types
pub use readiness::ReadinessState;
pub use record::{Delivery, EventRecord, StoredRecord};
