//! Single-slot callback registry for session events.
//!
//! Each [`EventKind`] has at most one active handler. Registering a new
//! handler for a kind replaces the previous one (last-write-wins), matching
//! the host platform's `on*`/`off*` contract; an event fired with no handler
//! registered is a silent no-op and is never buffered.

use std::collections::HashMap;

use tracing::debug;

use crate::event::{EventKind, SessionEvent};

/// Boxed event handler stored in a subscription slot.
///
/// Handlers run on the session loop's task, so they must be `Send` and should
/// return quickly; anything long-running belongs on a channel.
pub type EventHandler = Box<dyn FnMut(SessionEvent) + Send>;

/// Registry mapping each event kind to at most one handler.
#[derive(Default)]
pub struct EventDispatcher {
    slots: HashMap<EventKind, EventHandler>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`, replacing any previous handler.
    pub fn on(&mut self, kind: EventKind, handler: EventHandler) {
        if self.slots.insert(kind, handler).is_some() {
            debug!(?kind, "event handler replaced");
        }
    }

    /// Clear the slot for `kind`. No-op if nothing was registered.
    pub fn off(&mut self, kind: EventKind) {
        self.slots.remove(&kind);
    }

    /// Deliver `event` to the handler registered for its kind, if any.
    pub fn emit(&mut self, event: SessionEvent) {
        let kind = event.kind();
        if let Some(handler) = self.slots.get_mut(&kind) {
            handler(event);
        } else {
            debug!(?kind, "event dropped, no handler registered");
        }
    }

    /// Drop every registered handler. Used by `destroy`.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Whether a handler is registered for `kind`.
    pub fn has_handler(&self, kind: EventKind) -> bool {
        self.slots.contains_key(&kind)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("registered", &self.slots.len())
            .finish()
    }
}
