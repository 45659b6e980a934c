use crate::domain::Event;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("Event transform failed: {0}")]
    Failed(String),
    #[error("Event transform panicked: {0}")]
    Panicked(String),
}

impl TransformError {
    pub fn failed(message: impl Into<String>) -> Self {
        TransformError::Failed(message.into())
    }
}

/// Rewrites an enriched event just before it is queued.
///
/// Closures of the form `Fn(&Event) -> Result<Event, TransformError>`
/// implement this trait, so most hosts never name it.
pub trait EventTransform: Send + Sync {
    fn transform(&self, event: &Event) -> Result<Event, TransformError>;
}

impl<F> EventTransform for F
where
    F: Fn(&Event) -> Result<Event, TransformError> + Send + Sync,
{
    fn transform(&self, event: &Event) -> Result<Event, TransformError> {
        self(event)
    }
}

/// Runs `transform` and falls back to `event` on error or panic.
///
/// The id and timestamp assigned at enrichment are kept whatever the
/// transform returns.
pub fn apply(transform: &dyn EventTransform, event: Event) -> Event {
    let result = panic::catch_unwind(AssertUnwindSafe(|| transform.transform(&event)))
        .unwrap_or_else(|payload| Err(TransformError::Panicked(panic_message(&*payload))));

    match result {
        Ok(mut transformed) => {
            transformed.id = event.id;
            transformed.timestamp = event.timestamp;
            transformed
        }
        Err(e) => {
            warn!(event_id = %event.id, error = %e, "Using untransformed event");
            event
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
