//! Convenience calls for the built-in event channels.

use super::{AnalyticsEngine, DropReason, TrackOutcome};
use crate::buffer::OverflowError;
use crate::domain::{ErrorDetail, PartialEvent};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Clicks,
    Errors,
    Performance,
    Navigation,
}

impl AnalyticsEngine {
    pub fn is_channel_enabled(&self, channel: Channel) -> bool {
        let channels = &self.inner.config.channels;
        match channel {
            Channel::Clicks => channels.clicks,
            Channel::Errors => channels.errors,
            Channel::Performance => channels.performance,
            Channel::Navigation => channels.navigation,
        }
    }

    pub fn track_click(
        &self,
        target: impl Into<String>,
        x: f64,
        y: f64,
    ) -> Result<TrackOutcome, OverflowError> {
        self.track_on(
            Channel::Clicks,
            PartialEvent::new("click")
                .with_target(target)
                .with_coordinates(x, y),
        )
    }

    pub fn track_error(&self, detail: ErrorDetail) -> Result<TrackOutcome, OverflowError> {
        self.track_on(Channel::Errors, PartialEvent::error(detail))
    }

    /// Records a named timing in milliseconds.
    pub fn track_performance(
        &self,
        name: impl Into<String>,
        duration_ms: f64,
    ) -> Result<TrackOutcome, OverflowError> {
        self.track_on(
            Channel::Performance,
            PartialEvent::new("performance")
                .with_target(name)
                .with_duration(duration_ms),
        )
    }

    pub fn track_navigation(
        &self,
        from: Option<&str>,
        to: impl Into<String>,
    ) -> Result<TrackOutcome, OverflowError> {
        let to = to.into();
        let mut partial = PartialEvent::new("navigation")
            .with_target(to.clone())
            .with_metadata("to", to);
        if let Some(from) = from {
            partial = partial.with_metadata("from", from);
        }
        self.track_on(Channel::Navigation, partial)
    }

    /// Always available; `data` keys land in the event metadata next to `name`.
    pub fn track_custom(
        &self,
        name: impl Into<String>,
        data: Map<String, Value>,
    ) -> Result<TrackOutcome, OverflowError> {
        let mut partial = PartialEvent::new("custom").with_metadata("name", name.into());
        partial.metadata.extend(data);
        self.track(partial)
    }

    fn track_on(
        &self,
        channel: Channel,
        partial: PartialEvent,
    ) -> Result<TrackOutcome, OverflowError> {
        if !self.is_channel_enabled(channel) {
            return Ok(TrackOutcome::Dropped(DropReason::ChannelDisabled(channel)));
        }
        self.track(partial)
    }
}
