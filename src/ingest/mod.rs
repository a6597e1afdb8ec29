//! Event intake from external receivers.
//!
//! The pipeline:
//!
//! 1. **Intake**: durable append (with an in-memory fallback) before any
//!    delivery attempt
//! 2. **Watcher**: notices appends made by other processes and requests a
//!    flush
//!
//! # Architecture
//!
//! ```text
//! Receiver → Intake → inbox.jsonl → Flush → Emitter → Listener
//!                          ↑
//!               Watcher (other processes)
//! ```

pub mod intake;
pub mod watcher;

// Re-export key types
pub use intake::{IngestOutcome, Intake, PendingEvent};
pub use watcher::{StoreWatcher, WatchHandle, WatcherError};
