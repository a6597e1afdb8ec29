//! Transport from the flush coordinator to the registered listener.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::{Delivery, EventRecord};

/// Errors that can occur while handing a record to the listener
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("No listener subscribed")]
    NoListener,

    #[error("Listener {0} went away")]
    Closed(u64),
}

/// Pushes one record at a time to the listener.
///
/// Implementations do not retry; a failed emit leaves the record undelivered
/// and the next flush picks it up again.
#[async_trait]
pub trait Emitter: Send + Sync {
    async fn emit(&self, record: &EventRecord) -> Result<(), EmitError>;
}

/// Receiving end held by the listener
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next delivery. `None` once the subscription is replaced
    /// or unsubscribed.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// Take a delivery if one is already queued
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }

    /// Drain everything currently queued
    pub fn drain(&mut self) -> Vec<Delivery> {
        let mut out = Vec::new();
        while let Some(delivery) = self.try_recv() {
            out.push(delivery);
        }
        out
    }
}

struct Slot {
    id: u64,
    tx: mpsc::UnboundedSender<Delivery>,
}

/// Single-listener channel emitter.
///
/// Subscribing replaces any previous listener; there is no fan-out.
#[derive(Default)]
pub struct ChannelEmitter {
    slot: Mutex<Option<Slot>>,
    next_id: AtomicU64,
}

impl ChannelEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Slot>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a listener, dropping any previous one
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();

        if let Some(previous) = self.slot().replace(Slot { id, tx }) {
            debug!(previous = previous.id, id, "Listener replaced");
        } else {
            debug!(id, "Listener subscribed");
        }

        Subscription { id, rx }
    }

    /// Detach the listener with `id`. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut slot = self.slot();
        match slot.as_ref() {
            Some(current) if current.id == id => {
                *slot = None;
                debug!(id, "Listener unsubscribed");
                true
            }
            _ => false,
        }
    }

    pub fn has_listener(&self) -> bool {
        self.slot()
            .as_ref()
            .map(|slot| !slot.tx.is_closed())
            .unwrap_or(false)
    }
}

#[async_trait]
impl Emitter for ChannelEmitter {
    async fn emit(&self, record: &EventRecord) -> Result<(), EmitError> {
        let slot = self.slot();
        let slot = slot.as_ref().ok_or(EmitError::NoListener)?;

        slot.tx
            .send(record.to_delivery())
            .map_err(|_| EmitError::Closed(slot.id))?;

        debug!(sequence = record.sequence, listener = slot.id, "Emitted record");
        Ok(())
    }
}
