//! ui::sink
//!
//! The notification seam between the engine and the UI layer.
//!
//! The sink never mutates the store; it receives computed view updates
//! and rate-limit readouts. Implementations are expected to marshal onto
//! their UI thread themselves; the engine calls the sink from async task
//! context.

use super::view::{Filter, ViewUpdate};
use crate::remote::RateLimits;

/// Receiver of engine notifications.
pub trait UiSink: Send + Sync {
    /// The filters of all currently active panels. Consulted when the
    /// engine rebuilds the view.
    fn active_filters(&self) -> Vec<Filter>;

    /// Deliver a recomputed view: elements grouped by active filter plus
    /// the current user set.
    fn refresh(&self, update: ViewUpdate);

    /// Deliver the latest remote call budget.
    fn update_rate_limits(&self, limits: RateLimits);

    /// Deliver a transient status line ("Opening owner/repo", ...).
    fn status_message(&self, message: &str);
}

/// A sink that ignores every notification. Useful for headless use and
/// as a base for tests that only care about engine state.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl UiSink for NullSink {
    fn active_filters(&self) -> Vec<Filter> {
        Vec::new()
    }

    fn refresh(&self, _update: ViewUpdate) {}

    fn update_rate_limits(&self, _limits: RateLimits) {}

    fn status_message(&self, _message: &str) {}
}
