//! The tracking surface handed to the host application.
//!
//! `AnalyticsEngine` is a cheaply cloneable handle. Every clone talks to the
//! same queue, consent state and timers; the background tasks stop when the
//! last handle is dropped or `shutdown` is called.

mod binding;
mod builder;
mod channels;
mod error;
mod inner;
mod timers;

pub use binding::ElementBinding;
pub use builder::EngineBuilder;
pub use channels::Channel;
pub use error::EngineError;

use crate::buffer::{BufferState, OverflowError};
use crate::config::{EngineConfig, EngineOptions};
use crate::delivery::{DeliveryState, FlushOutcome};
use crate::domain::{Event, EventId, NetworkStatus, PartialEvent};
use crate::sampling::{self, ConsentState, GateDecision};
use inner::Inner;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::info;

/// Result of a `track` call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    Queued(EventId),
    /// Not admitted; nothing was queued.
    Dropped(DropReason),
    /// Admitted but refused by a full queue under `DiscardNewest`.
    Discarded,
}

impl TrackOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, TrackOutcome::Queued(_))
    }

    pub fn event_id(&self) -> Option<EventId> {
        match self {
            TrackOutcome::Queued(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Gate(GateDecision),
    ChannelDisabled(Channel),
    BindingReleased,
}

#[derive(Clone)]
pub struct AnalyticsEngine {
    inner: Arc<Inner>,
}

impl AnalyticsEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Starts an engine with the default collaborators.
    pub async fn initialize(options: EngineOptions) -> Result<Self, EngineError> {
        EngineBuilder::new().initialize(options).await
    }

    /// Admits, enriches and queues one event without blocking on I/O.
    ///
    /// Only a full queue under the `Reject` policy is an error.
    pub fn track(&self, partial: PartialEvent) -> Result<TrackOutcome, OverflowError> {
        self.inner.track(partial, true)
    }

    /// Attempts one delivery of everything currently queued.
    pub async fn flush(&self) -> FlushOutcome {
        self.inner.flush_now().await
    }

    /// Records the user's answer. Revoking consent drops every queued event
    /// and erases persisted storage before returning.
    pub fn set_consent(&self, granted: bool) {
        {
            let mut state = self.inner.state.lock();
            state.consent.granted = Some(granted);
            if !granted {
                state.outbox.queue.clear();
                state.outbox.queue.reset_overflow_count();
            }
        }

        if granted {
            info!("Tracking consent granted");
        } else {
            self.inner.erase_storage();
            info!("Tracking consent revoked; queued and persisted events erased");
        }
    }

    pub fn set_debug_mode(&self, debug: bool) {
        self.inner.state.lock().debug = debug;
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.state.lock().enabled = enabled;
    }

    /// Going back online with events queued starts a flush.
    pub fn update_network_status(&self, status: NetworkStatus) {
        let reconnected = {
            let mut state = self.inner.state.lock();
            let was_online = state.outbox.network.is_online();
            state.outbox.network = status;
            !was_online && status.is_online() && !state.outbox.queue.is_empty()
        };

        if reconnected {
            info!("Network back online, flushing queued events");
            self.inner.spawn_flush();
        }
    }

    /// Drops every queued event and resets the overflow counters.
    pub fn clear_events(&self) {
        {
            let mut state = self.inner.state.lock();
            state.outbox.queue.clear();
            state.outbox.queue.reset_overflow_count();
        }
        self.inner.schedule_persist();
    }

    /// Queued events matching `predicate`, oldest first.
    pub fn filter_events<F>(&self, mut predicate: F) -> Vec<Event>
    where
        F: FnMut(&Event) -> bool,
    {
        let state = self.inner.state.lock();
        state
            .outbox
            .queue
            .iter()
            .filter(|e| predicate(*e))
            .cloned()
            .collect()
    }

    /// Keeps only queued events matching `predicate`. Returns how many were removed.
    pub fn retain_events<F>(&self, predicate: F) -> usize
    where
        F: FnMut(&Event) -> bool,
    {
        let removed = self.inner.state.lock().outbox.queue.retain(predicate);
        if removed > 0 {
            self.inner.schedule_persist();
        }
        removed
    }

    pub fn events(&self) -> Vec<Event> {
        self.inner.state.lock().outbox.queue.snapshot()
    }

    /// Queue contents as a JSON array, oldest first.
    pub fn export_events(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.events())
    }

    pub fn event_count(&self) -> usize {
        self.inner.state.lock().outbox.queue.len()
    }

    /// Whether an event tracked now would pass the privacy checks.
    /// Sampling is not considered.
    pub fn is_tracking_allowed(&self) -> bool {
        let state = self.inner.state.lock();
        sampling::check(&self.inner.policy(&state), &state.consent).is_none()
    }

    pub fn should_show_debug_info(&self) -> bool {
        let state = self.inner.state.lock();
        state.debug && state.enabled
    }

    pub fn buffer_state(&self) -> BufferState {
        self.inner.state.lock().outbox.queue.state()
    }

    pub fn delivery_state(&self) -> DeliveryState {
        self.inner.state.lock().outbox.delivery.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.state.lock().enabled
    }

    pub fn network_status(&self) -> NetworkStatus {
        self.inner.state.lock().outbox.network
    }

    pub fn consent(&self) -> ConsentState {
        self.inner.state.lock().consent
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Teardown: stop tracking, disarm timers, wait for background work,
    /// persist the queue and make a final delivery attempt.
    ///
    /// Returns `None` if the engine was already shut down.
    pub async fn shutdown(&self) -> Option<FlushOutcome> {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return None;
        }

        {
            let mut state = self.inner.state.lock();
            state.enabled = false;
            state.bindings.clear();
        }
        self.inner.cancel.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;

        let inner = Arc::clone(&self.inner);
        if let Err(e) = tokio::task::spawn_blocking(move || inner.persist_blocking()).await {
            tracing::warn!("Final persist task failed: {}", e);
        }

        let outcome = self.inner.flush_now().await;
        // The flush may have scheduled a snapshot rewrite
        self.inner.tracker.wait().await;

        let delivery = self.delivery_state();
        info!(
            remaining = self.event_count(),
            delivered_batches = delivery.successful_submission_count,
            failed_batches = delivery.failed_submission_count,
            "Analytics engine shut down"
        );

        Some(outcome)
    }
}
