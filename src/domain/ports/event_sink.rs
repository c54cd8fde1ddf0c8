//! Event Sink Port
//!
//! Receives every newly applied drawing event, e.g. to update a view.

use crate::replication::Event;

/// Consumer of applied events.
///
/// Called once per event that was new to the local store, never with the
/// engine lock held, so implementations may originate messages themselves.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &Event);
}

impl<F> EventSink for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn on_event(&self, event: &Event) {
        self(event)
    }
}
