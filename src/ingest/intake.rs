//! Durable intake of events handed over by an external receiver.
//!
//! The receiver has no error channel, so a store failure is never surfaced:
//! the event is parked in an in-memory buffer and re-appended (ahead of any
//! newer event) the next time intake or a lifecycle trigger runs.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::core::store::RecordStore;
use crate::domain::EventRecord;

/// An event that could not be written yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEvent {
    pub sender: String,
    pub body: String,
}

/// What happened to an ingested event
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// Durably stored
    Stored(EventRecord),

    /// Held in memory until the store accepts writes again
    Buffered { pending: usize },
}

impl IngestOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored(_))
    }
}

/// Serializes appends and owns the fallback buffer
pub struct Intake {
    store: Arc<dyn RecordStore>,
    fallback: Mutex<VecDeque<PendingEvent>>,
}

impl Intake {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            fallback: Mutex::new(VecDeque::new()),
        }
    }

    /// Append an event, keeping arrival order with anything still buffered
    pub async fn accept(&self, sender: &str, body: &str) -> IngestOutcome {
        let mut fallback = self.fallback.lock().await;
        self.drain(&mut fallback).await;

        if !fallback.is_empty() {
            fallback.push_back(PendingEvent {
                sender: sender.to_string(),
                body: body.to_string(),
            });
            warn!(pending = fallback.len(), "Store still unavailable, event buffered in memory");
            return IngestOutcome::Buffered {
                pending: fallback.len(),
            };
        }

        match self.store.append(sender, body).await {
            Ok(record) => IngestOutcome::Stored(record),
            Err(e) => {
                error!(error = %e, sender, "Failed to persist event, buffering in memory");
                fallback.push_back(PendingEvent {
                    sender: sender.to_string(),
                    body: body.to_string(),
                });
                IngestOutcome::Buffered {
                    pending: fallback.len(),
                }
            }
        }
    }

    /// Retry buffered events. Returns how many are still waiting.
    pub async fn retry_buffered(&self) -> usize {
        let mut fallback = self.fallback.lock().await;
        self.drain(&mut fallback).await;
        fallback.len()
    }

    /// Number of events waiting in memory
    pub async fn buffered(&self) -> usize {
        self.fallback.lock().await.len()
    }

    async fn drain(&self, fallback: &mut VecDeque<PendingEvent>) {
        if fallback.is_empty() {
            return;
        }

        let mut recovered = 0;
        while let Some(event) = fallback.front().cloned() {
            match self.store.append(&event.sender, &event.body).await {
                Ok(_) => {
                    fallback.pop_front();
                    recovered += 1;
                }
                Err(e) => {
                    warn!(error = %e, pending = fallback.len(), "Store still failing, keeping buffered events");
                    break;
                }
            }
        }

        if recovered > 0 {
            info!(recovered, pending = fallback.len(), "Buffered events persisted");
        }
    }
}
