use super::{DropReason, TrackOutcome};
use crate::buffer::OverflowError;
use crate::config::EngineConfig;
use crate::delivery::{DeliveryController, FlushOutcome, Outbox, OutboxAccess};
use crate::domain::{ErrorDetail, PartialEvent};
use crate::enrich::EventEnricher;
use crate::reliability::PersistenceAdapter;
use crate::sampling::{self, ConsentState, SamplingPolicy};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Mutable engine state. One lock, never held across an await.
pub(crate) struct EngineState {
    pub outbox: Outbox,
    pub enabled: bool,
    pub debug: bool,
    pub consent: ConsentState,
    /// Live element bindings by id, with their targets.
    pub bindings: HashMap<u64, String>,
}

impl OutboxAccess for Mutex<EngineState> {
    fn with_outbox<R>(&self, f: impl FnOnce(&mut Outbox) -> R) -> R {
        f(&mut self.lock().outbox)
    }
}

pub(crate) struct Inner {
    pub config: EngineConfig,
    pub state: Mutex<EngineState>,
    pub enricher: EventEnricher,
    pub delivery: DeliveryController,
    pub persistence: Option<Arc<PersistenceAdapter>>,
    pub runtime: Handle,
    pub tracker: TaskTracker,
    pub cancel: CancellationToken,
    pub persist_scheduled: AtomicBool,
    pub shut_down: AtomicBool,
    pub next_binding_id: AtomicU64,
    pub started_at: Instant,
}

impl Inner {
    pub fn policy(&self, state: &EngineState) -> SamplingPolicy {
        SamplingPolicy::from_config(&self.config, state.enabled)
    }

    /// admit → enrich → push, then the follow-ups.
    ///
    /// `auto_flush` is off for events the engine records about its own
    /// delivery failures, so a failing endpoint cannot re-trigger itself.
    pub fn track(
        self: &Arc<Self>,
        partial: PartialEvent,
        auto_flush: bool,
    ) -> Result<TrackOutcome, OverflowError> {
        let (decision, debug_mode) = {
            let state = self.state.lock();
            let policy = self.policy(&state);
            (
                sampling::decide(&policy, &state.consent, &mut rand::rng()),
                state.debug,
            )
        };
        if !decision.is_admitted() {
            debug!(reason = %decision, "Event not admitted");
            return Ok(TrackOutcome::Dropped(DropReason::Gate(decision)));
        }

        // The transform hook runs outside the lock
        let event = self.enricher.enrich(partial);
        let id = event.id;
        let event_type = event.event_type.clone();

        let (admitted, queued) = {
            let mut state = self.state.lock();
            // Consent may have been revoked while enriching
            if let Some(blocked) = sampling::check(&self.policy(&state), &state.consent) {
                return Ok(TrackOutcome::Dropped(DropReason::Gate(blocked)));
            }
            match state.outbox.queue.push(event) {
                Ok(admitted) => (admitted, state.outbox.queue.len()),
                Err(e) => {
                    warn!(event_id = %id, "Event rejected: {}", e);
                    return Err(e);
                }
            }
        };

        if !admitted {
            debug!(event_id = %id, "Queue full, discarded incoming event");
            return Ok(TrackOutcome::Discarded);
        }

        if debug_mode {
            info!(event_id = %id, event_type = %event_type, queued, "Tracked event");
        } else {
            debug!(event_id = %id, event_type = %event_type, queued, "Tracked event");
        }

        self.schedule_persist();
        if auto_flush && queued >= self.config.batch_size {
            self.spawn_flush();
        }

        Ok(TrackOutcome::Queued(id))
    }

    pub async fn flush_now(self: &Arc<Self>) -> FlushOutcome {
        let outcome = self.delivery.flush(&self.state).await;

        match &outcome {
            FlushOutcome::Delivered {
                receipt,
                removed,
                remaining,
            } => {
                info!(
                    batch_id = %receipt.batch_id,
                    delivered = removed,
                    remaining,
                    "Flushed events"
                );
                // Rewrites the snapshot with what is left, or removes it
                self.schedule_persist();
            }
            FlushOutcome::Failed { error, attempted } => {
                warn!(attempted, "Event delivery failed: {}", error);
                if self.config.channels.errors {
                    let detail = ErrorDetail::new(format!("Event delivery failed: {error}"))
                        .with_kind("delivery_failure");
                    let partial = PartialEvent::error(detail)
                        .with_metadata("attemptedEvents", *attempted as u64);
                    if let Err(e) = self.track(partial, false) {
                        warn!("Could not record delivery failure: {}", e);
                    }
                }
            }
            FlushOutcome::Skipped(reason) => {
                debug!(%reason, "Flush skipped");
            }
        }

        outcome
    }

    pub fn spawn_flush(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        self.tracker.spawn_on(
            async move {
                inner.flush_now().await;
            },
            &self.runtime,
        );
    }

    /// Queues a snapshot write on the blocking pool; bursts coalesce into one.
    pub fn schedule_persist(self: &Arc<Self>) {
        if self.persistence.is_none() || self.persist_scheduled.swap(true, Ordering::AcqRel) {
            return;
        }

        let weak = Arc::downgrade(self);
        self.tracker.spawn_blocking_on(
            move || {
                if let Some(inner) = weak.upgrade() {
                    inner.persist_scheduled.store(false, Ordering::Release);
                    inner.persist_blocking();
                }
            },
            &self.runtime,
        );
    }

    /// Writes the current queue now. The snapshot is taken under the
    /// persistence write gate.
    pub fn persist_blocking(&self) {
        let Some(adapter) = &self.persistence else {
            return;
        };
        match adapter.save_with(|| self.state.lock().outbox.queue.snapshot()) {
            Ok(count) => debug!(count, key = adapter.key(), "Persisted queue snapshot"),
            Err(e) => warn!("Failed to persist queue snapshot: {}", e),
        }
    }

    pub fn erase_storage(&self) {
        if let Some(adapter) = &self.persistence
            && let Err(e) = adapter.erase()
        {
            warn!("Failed to erase persisted events: {}", e);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel.cancel();
        if !self.shut_down.load(Ordering::Acquire) {
            // Dropped without shutdown: keep what is queued for the next start
            self.persist_blocking();
        }
    }
}
