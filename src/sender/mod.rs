//! Outbound delivery of event batches.

pub mod client;
pub mod serialization;
pub mod transmission;

pub use client::{ClientConfig, ClientError, ClientStats, ConnectionStats, HttpClient};
pub use serialization::{PayloadSerializer, SerializationError};
pub use transmission::{COMPRESSION_THRESHOLD, HttpTransport};

use crate::domain::{Event, EventId, SessionContext};
use futures::future::BoxFuture;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Serialization failed: {0}")]
    Serialization(#[from] SerializationError),
    #[error("Endpoint rejected batch {batch_id}: HTTP {status}")]
    HttpStatus { status: u16, batch_id: String },
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Delivery timeout")]
    Timeout,
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(String),
}

impl DeliveryError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            DeliveryError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// One submission: a snapshot of queued events plus the session they belong to.
#[derive(Debug, Clone)]
pub struct EventBatch {
    pub batch_id: String,
    pub session: SessionContext,
    pub events: Vec<Event>,
}

impl EventBatch {
    pub fn new(events: Vec<Event>, session: SessionContext) -> Self {
        Self {
            batch_id: Uuid::new_v4().to_string(),
            session,
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn event_ids(&self) -> impl Iterator<Item = EventId> + '_ {
        self.events.iter().map(|e| e.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub batch_id: String,
    pub status_code: u16,
    pub events: usize,
    pub bytes_sent: usize,
    pub compressed: bool,
    pub latency: Duration,
}

/// Sends a batch to the collection endpoint.
///
/// Returning `Ok` means the endpoint acknowledged every event in the batch.
pub trait Transport: Send + Sync {
    fn submit(&self, batch: EventBatch) -> BoxFuture<'_, Result<DeliveryReceipt, DeliveryError>>;
}
