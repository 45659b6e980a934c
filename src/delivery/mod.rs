//! Flush lifecycle: snapshot the queue, submit one batch, reconcile by id.
//!
//! The controller owns no queue of its own. It reaches the engine's queue
//! and delivery bookkeeping through `OutboxAccess`, holding the lock only
//! for the snapshot and the reconciliation, never across the submission.

use crate::buffer::FixedCapacityQueue;
use crate::domain::{Event, EventId, NetworkStatus, SessionContext};
use crate::sender::{DeliveryError, DeliveryReceipt, EventBatch, Transport};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryState {
    /// Set while a submission is outstanding; at most one at a time.
    pub pending_flush: bool,
    pub last_flush_time: Option<DateTime<Utc>>,
    pub failed_submission_count: u64,
    pub successful_submission_count: u64,
}

/// Everything a flush reads or writes, kept under the engine's lock.
#[derive(Debug)]
pub struct Outbox {
    pub queue: FixedCapacityQueue<Event>,
    pub delivery: DeliveryState,
    pub network: NetworkStatus,
}

impl Outbox {
    pub fn new(queue: FixedCapacityQueue<Event>) -> Self {
        Self {
            queue,
            delivery: DeliveryState::default(),
            network: NetworkStatus::Online,
        }
    }
}

/// Grants short, synchronous access to the shared `Outbox`.
pub trait OutboxAccess: Send + Sync {
    fn with_outbox<R>(&self, f: impl FnOnce(&mut Outbox) -> R) -> R;
}

impl OutboxAccess for parking_lot::Mutex<Outbox> {
    fn with_outbox<R>(&self, f: impl FnOnce(&mut Outbox) -> R) -> R {
        f(&mut *self.lock())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Empty,
    InFlight,
    Offline,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::Empty => "queue empty",
            SkipReason::InFlight => "flush already in flight",
            SkipReason::Offline => "network offline",
        })
    }
}

#[derive(Debug)]
pub enum FlushOutcome {
    Skipped(SkipReason),
    Delivered {
        receipt: DeliveryReceipt,
        /// Events removed from the queue by reconciliation.
        removed: usize,
        /// Events left in the queue afterwards (pushed mid-flush).
        remaining: usize,
    },
    Failed {
        error: DeliveryError,
        attempted: usize,
    },
}

impl FlushOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, FlushOutcome::Delivered { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, FlushOutcome::Skipped(_))
    }
}

/// Clears `pending_flush` when the flush ends, however it ends.
struct PendingFlushGuard<'a, A: OutboxAccess + ?Sized> {
    outbox: &'a A,
}

impl<A: OutboxAccess + ?Sized> Drop for PendingFlushGuard<'_, A> {
    fn drop(&mut self) {
        self.outbox.with_outbox(|o| o.delivery.pending_flush = false);
    }
}

pub struct DeliveryController {
    transport: Arc<dyn Transport>,
    session: SessionContext,
}

impl DeliveryController {
    pub fn new(transport: Arc<dyn Transport>, session: SessionContext) -> Self {
        Self { transport, session }
    }

    pub async fn flush<A: OutboxAccess + ?Sized>(&self, outbox: &A) -> FlushOutcome {
        let claimed = outbox.with_outbox(|o| {
            if o.queue.is_empty() {
                return Err(SkipReason::Empty);
            }
            if o.delivery.pending_flush {
                return Err(SkipReason::InFlight);
            }
            if !o.network.is_online() {
                return Err(SkipReason::Offline);
            }
            o.delivery.pending_flush = true;
            Ok(o.queue.snapshot())
        });

        let events = match claimed {
            Ok(events) => events,
            Err(reason) => {
                debug!("Flush skipped: {}", reason);
                return FlushOutcome::Skipped(reason);
            }
        };
        let _guard = PendingFlushGuard { outbox };

        let batch = EventBatch::new(events, self.session.clone());
        let sent_ids: HashSet<EventId> = batch.event_ids().collect();
        let attempted = sent_ids.len();

        match self.transport.submit(batch).await {
            Ok(receipt) => {
                let (removed, remaining) = outbox.with_outbox(|o| {
                    let removed = o.queue.retain(|e| !sent_ids.contains(&e.id));
                    o.delivery.last_flush_time = Some(Utc::now());
                    o.delivery.successful_submission_count += 1;
                    (removed, o.queue.len())
                });
                debug!(
                    batch_id = %receipt.batch_id,
                    removed,
                    remaining,
                    "Reconciled queue after delivery"
                );
                FlushOutcome::Delivered {
                    receipt,
                    removed,
                    remaining,
                }
            }
            Err(error) => {
                outbox.with_outbox(|o| o.delivery.failed_submission_count += 1);
                FlushOutcome::Failed { error, attempted }
            }
        }
    }
}
