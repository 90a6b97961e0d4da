//! Seam between the registry and whatever delivers events to the UI
//!
//! The registry forwards component state changes as [`UiEvent`]s without
//! knowing who executes them. The scheduler implements this trait by turning
//! the event into a consumer-thread dispatch.

use cadence_common::UiEvent;

/// Receiver of UI-visible events
pub trait UiSink: Send + Sync {
    /// Hand over an event; must not block
    fn post_ui_event(&self, event: UiEvent);
}
