//! The delivery service wiring store, readiness, flush and transport.
//!
//! `Courier` is the one object the host embeds. Receivers call
//! [`Courier::ingest`]; the host's lifecycle callbacks call
//! [`Courier::on_runtime_resumed`] / [`Courier::on_runtime_suspended`]; the
//! listener calls [`Courier::subscribe`] and then
//! [`Courier::register_listener`], and should expect the whole backlog right
//! after registering.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::config::{DeliverySettings, ResolvedConfig};
use crate::domain::ReadinessState;
use crate::ingest::{IngestOutcome, Intake};

use super::emitter::{ChannelEmitter, Subscription};
use super::flush::{FlushCoordinator, FlushReport};
use super::readiness::ReadinessTracker;
use super::store::{JsonlStore, RecordStore, StoreError};

/// Main delivery service
pub struct Courier {
    store: Arc<dyn RecordStore>,
    readiness: Arc<ReadinessTracker>,
    emitter: Arc<ChannelEmitter>,
    flusher: FlushCoordinator,
    intake: Intake,
}

impl Courier {
    /// Build a courier over an existing store
    pub fn new(store: Arc<dyn RecordStore>, settings: &DeliverySettings) -> Self {
        let readiness = Arc::new(ReadinessTracker::new());
        let emitter = Arc::new(ChannelEmitter::new());
        let flusher = FlushCoordinator::new(store.clone(), readiness.clone(), emitter.clone())
            .with_retention(settings.retain_delivered);

        Self {
            intake: Intake::new(store.clone()),
            store,
            readiness,
            emitter,
            flusher,
        }
    }

    /// Open the JSONL store named by the configuration
    pub async fn open(config: &ResolvedConfig) -> Result<Self, StoreError> {
        let store = JsonlStore::open(&config.store_path).await?;
        Ok(Self::new(Arc::new(store), &config.delivery))
    }

    /// Accept an event from an external receiver: persist, then try to deliver.
    ///
    /// Never fails from the caller's point of view.
    #[instrument(skip(self, body))]
    pub async fn ingest(&self, sender: &str, body: &str) -> IngestOutcome {
        let outcome = self.intake.accept(sender, body).await;
        self.flusher.flush().await;
        outcome
    }

    /// Host lifecycle: runtime resumed / started
    pub async fn on_runtime_resumed(&self) -> FlushReport {
        self.readiness.on_runtime_resumed();
        self.trigger().await
    }

    /// Host lifecycle: runtime paused or destroyed
    pub fn on_runtime_suspended(&self) {
        self.readiness.on_runtime_suspended();
    }

    /// The listener announces that it can receive deliveries
    pub async fn register_listener(&self) -> FlushReport {
        let transition = self.readiness.on_listener_registered();
        if !transition.changed() {
            debug!(state = %transition.to, "Listener registration did not change readiness");
        }
        self.trigger().await
    }

    /// Explicit request to pick up anything missed
    pub async fn request_flush(&self) -> FlushReport {
        self.trigger().await
    }

    /// Attach the listener's receiving end (replaces any previous listener)
    pub fn subscribe(&self) -> Subscription {
        self.emitter.subscribe()
    }

    /// Detach a listener
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.emitter.unsubscribe(subscription.id())
    }

    pub fn state(&self) -> ReadinessState {
        self.readiness.current_state()
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Events held in memory because the store rejected them
    pub async fn buffered(&self) -> usize {
        self.intake.buffered().await
    }

    async fn trigger(&self) -> FlushReport {
        self.intake.retry_buffered().await;
        self.flusher.flush().await
    }
}
