//! courier - Durable, order-preserving event delivery
//!
//! Delivers inbound events (e.g. SMS) from a receiver whose lifecycle is
//! independent of the application into a listener that may attach much
//! later, or not until the next process start.
//!
//! # Architecture
//!
//! The inbox log is the single source of truth:
//! - Every event is appended durably before any delivery attempt
//! - Delivery only happens once the runtime is attached and the listener
//!   has registered
//! - Each record is emitted, then flagged delivered, in arrival order
//!
//! # Modules
//!
//! - `core`: Store, readiness, flush coordination, emitter
//! - `domain`: Data structures (EventRecord, ReadinessState)
//! - `ingest`: Receiver intake and the store watcher
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Act as the receiver (separate process)
//! courier ingest --sender +1555 --body hello
//!
//! # Act as the application and print deliveries
//! courier listen
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod ingest;

// Re-export main types at crate root for convenience
pub use crate::core::{Courier, FlushOutcome, FlushReport, JsonlStore, RecordStore, Subscription};
pub use crate::domain::{Delivery, EventRecord, ReadinessState};
pub use crate::ingest::{IngestOutcome, StoreWatcher};
