//! Turns caller-supplied partial events into complete, queueable events.

pub mod environment;
pub mod transform;

pub use environment::{EnvironmentProvider, HostEnvironment, StaticEnvironment};
pub use transform::{EventTransform, TransformError};

use crate::domain::{DEFAULT_EVENT_TYPE, Event, EventId, PartialEvent, SessionContext};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

pub struct EventEnricher {
    session_defaults: SessionContext,
    collect_environment: bool,
    environment: Arc<dyn EnvironmentProvider>,
    transform: Option<Arc<dyn EventTransform>>,
}

impl EventEnricher {
    pub fn new(
        session_defaults: SessionContext,
        collect_environment: bool,
        environment: Arc<dyn EnvironmentProvider>,
    ) -> Self {
        Self {
            session_defaults,
            collect_environment,
            environment,
            transform: None,
        }
    }

    pub fn with_transform(mut self, transform: Arc<dyn EventTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Assigns id and timestamp, fills defaults and runs the transform hook.
    pub fn enrich(&self, partial: PartialEvent) -> Event {
        let session_context = partial
            .session_context
            .unwrap_or_default()
            .or(&self.session_defaults);

        let environment = match partial.environment {
            Some(env) => Some(env),
            None if self.collect_environment => Some(self.environment.snapshot()),
            None => None,
        };

        let event = Event {
            id: EventId::new(),
            timestamp: Utc::now().timestamp_millis(),
            event_type: partial
                .event_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string()),
            session_context,
            target: partial.target,
            coordinates: partial.coordinates,
            duration: partial.duration,
            element: partial.element,
            environment,
            metadata: partial.metadata,
            error: partial.error,
        };

        let event = match &self.transform {
            Some(hook) => transform::apply(hook.as_ref(), event),
            None => event,
        };
        drop_non_finite(event)
    }
}

/// JSON has no NaN or infinity; serde_json would write them as `null` and the
/// event could no longer be read back.
fn drop_non_finite(mut event: Event) -> Event {
    if let Some(coords) = event.coordinates
        && !(coords.x.is_finite() && coords.y.is_finite())
    {
        debug!(event_id = %event.id, "Dropping non-finite coordinates");
        event.coordinates = None;
    }
    if let Some(duration) = event.duration
        && !duration.is_finite()
    {
        debug!(event_id = %event.id, "Dropping non-finite duration");
        event.duration = None;
    }
    event
}
