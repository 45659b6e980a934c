use super::inner::Inner;
use super::{AnalyticsEngine, Channel, DropReason, TrackOutcome};
use crate::buffer::OverflowError;
use crate::domain::{ElementMetadata, PartialEvent};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Tracks events on behalf of one UI element until disposed.
///
/// Dropping the binding releases it; `shutdown` releases every binding.
/// A released binding produces no events.
#[derive(Debug)]
pub struct ElementBinding {
    id: u64,
    target: String,
    element: ElementMetadata,
    engine: Weak<Inner>,
}

impl AnalyticsEngine {
    pub fn bind(&self, target: impl Into<String>, element: ElementMetadata) -> ElementBinding {
        let id = self.inner.next_binding_id.fetch_add(1, Ordering::Relaxed);
        let target = target.into();

        self.inner.state.lock().bindings.insert(id, target.clone());
        debug!(binding = id, target = %target, "Element bound");

        ElementBinding {
            id,
            target,
            element,
            engine: Arc::downgrade(&self.inner),
        }
    }

    pub fn active_bindings(&self) -> usize {
        self.inner.state.lock().bindings.len()
    }

    /// Targets of the live bindings, sorted.
    pub fn bound_targets(&self) -> Vec<String> {
        let state = self.inner.state.lock();
        let mut targets: Vec<String> = state.bindings.values().cloned().collect();
        targets.sort();
        targets
    }
}

impl ElementBinding {
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn element(&self) -> &ElementMetadata {
        &self.element
    }

    pub fn is_active(&self) -> bool {
        match self.engine.upgrade() {
            Some(inner) => {
                let state = inner.state.lock();
                state.bindings.contains_key(&self.id)
            }
            None => false,
        }
    }

    /// Click on the bound element; gated by the clicks channel.
    pub fn click(&self, x: f64, y: f64) -> Result<TrackOutcome, OverflowError> {
        let Some(inner) = self.engine.upgrade() else {
            return Ok(TrackOutcome::Dropped(DropReason::BindingReleased));
        };
        if !inner.config.channels.clicks {
            return Ok(TrackOutcome::Dropped(DropReason::ChannelDisabled(
                Channel::Clicks,
            )));
        }
        self.track(PartialEvent::new("click").with_coordinates(x, y))
    }

    /// Tracks `partial` with the bound target and element filled in where absent.
    pub fn track(&self, mut partial: PartialEvent) -> Result<TrackOutcome, OverflowError> {
        let Some(inner) = self.engine.upgrade() else {
            return Ok(TrackOutcome::Dropped(DropReason::BindingReleased));
        };
        if !inner.state.lock().bindings.contains_key(&self.id) {
            return Ok(TrackOutcome::Dropped(DropReason::BindingReleased));
        }

        if partial.target.is_none() {
            partial.target = Some(self.target.clone());
        }
        if partial.element.is_none() {
            partial.element = Some(self.element.clone());
        }
        inner.track(partial, true)
    }

    pub fn dispose(self) {
        // Released by Drop
    }
}

impl Drop for ElementBinding {
    fn drop(&mut self) {
        if let Some(inner) = self.engine.upgrade()
            && inner.state.lock().bindings.remove(&self.id).is_some()
        {
            debug!(binding = self.id, target = %self.target, "Element binding released");
        }
    }
}
