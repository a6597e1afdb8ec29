//! Core delivery logic.
//!
//! This module contains:
//! - Store: Durable JSONL inbox log
//! - Readiness: Runtime/listener lifecycle state machine
//! - Flush: Single-flight backlog delivery
//! - Emitter: Ordered transport to the listener
//! - Courier: The service wiring them together

pub mod courier;
pub mod emitter;
pub mod flush;
pub mod readiness;
pub mod store;

// Re-export commonly used types
pub use courier::Courier;
pub use emitter::{ChannelEmitter, EmitError, Emitter, Subscription};
pub use flush::{FlushCoordinator, FlushOutcome, FlushReport};
pub use readiness::{ReadinessTracker, Transition};
pub use store::{JsonlStore, RecordStore, StoreError, StoreStats};
