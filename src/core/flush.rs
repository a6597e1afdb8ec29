//! Flush coordination: moving the undelivered backlog to the listener.
//!
//! Flushes are single-flight. A trigger that arrives while another flush is
//! running waits on the gate and then re-scans the store, so two racing
//! triggers can never emit the same record twice.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use super::emitter::Emitter;
use super::readiness::ReadinessTracker;
use super::store::RecordStore;

/// How a flush ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Readiness was not `Ready`; nothing was read
    NotReady,

    /// Every undelivered record was delivered
    Drained,

    /// Stopped early (store or transport failure, or the runtime went away);
    /// the rest stays undelivered for the next trigger
    Interrupted,
}

/// Summary of one flush invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub outcome: FlushOutcome,
    pub delivered: usize,
}

impl FlushReport {
    fn not_ready() -> Self {
        Self {
            outcome: FlushOutcome::NotReady,
            delivered: 0,
        }
    }
}

/// Drives `list_undelivered` → `emit` → `mark_delivered`
pub struct FlushCoordinator {
    store: Arc<dyn RecordStore>,
    readiness: Arc<ReadinessTracker>,
    emitter: Arc<dyn Emitter>,

    /// Held for the whole duration of a flush
    gate: Mutex<()>,

    /// Prune delivered records beyond this count after a drained flush
    retain_delivered: Option<usize>,
}

impl FlushCoordinator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        readiness: Arc<ReadinessTracker>,
        emitter: Arc<dyn Emitter>,
    ) -> Self {
        Self {
            store,
            readiness,
            emitter,
            gate: Mutex::new(()),
            retain_delivered: None,
        }
    }

    /// Compact the log after each drained flush
    pub fn with_retention(mut self, retain_delivered: Option<usize>) -> Self {
        self.retain_delivered = retain_delivered;
        self
    }

    /// Deliver every undelivered record in sequence order.
    ///
    /// Each record is emitted and then marked. A crash between the two
    /// redelivers that one record on the next flush. The first failure stops
    /// the flush so later records never overtake an earlier one.
    #[instrument(skip(self))]
    pub async fn flush(&self) -> FlushReport {
        let _gate = self.gate.lock().await;

        if !self.readiness.current_state().can_deliver() {
            debug!(state = %self.readiness.current_state(), "Flush skipped: not ready");
            return FlushReport::not_ready();
        }

        let backlog = match self.store.list_undelivered().await {
            Ok(backlog) => backlog,
            Err(e) => {
                error!(error = %e, "Failed to read undelivered records");
                return FlushReport {
                    outcome: FlushOutcome::Interrupted,
                    delivered: 0,
                };
            }
        };

        if backlog.is_empty() {
            return FlushReport {
                outcome: FlushOutcome::Drained,
                delivered: 0,
            };
        }

        debug!(backlog = backlog.len(), "Flushing backlog");

        let mut delivered = 0;
        for record in &backlog {
            if !self.readiness.current_state().can_deliver() {
                info!(delivered, remaining = backlog.len() - delivered, "Runtime detached mid-flush");
                return FlushReport {
                    outcome: FlushOutcome::Interrupted,
                    delivered,
                };
            }

            if let Err(e) = self.emitter.emit(record).await {
                warn!(sequence = record.sequence, error = %e, "Delivery failed, will retry on next flush");
                return FlushReport {
                    outcome: FlushOutcome::Interrupted,
                    delivered,
                };
            }

            if let Err(e) = self.store.mark_delivered(record).await {
                error!(
                    sequence = record.sequence,
                    error = %e,
                    "Record emitted but not marked; it will be delivered again"
                );
                return FlushReport {
                    outcome: FlushOutcome::Interrupted,
                    delivered,
                };
            }

            delivered += 1;
        }

        info!(delivered, "Backlog flushed");

        if let Some(retain) = self.retain_delivered {
            if let Err(e) = self.store.compact(retain).await {
                warn!(error = %e, "Failed to compact inbox log");
            }
        }

        FlushReport {
            outcome: FlushOutcome::Drained,
            delivered,
        }
    }
}
