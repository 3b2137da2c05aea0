//! Event Bus
//!
//! `mode_change` and `machine_state` events are published here for
//! consumption by the external real-time push layer (spec §6). A broadcast
//! channel is used rather than a bespoke pub-sub registry: any number of
//! subscribers may come and go, and a slow or absent subscriber never
//! blocks the Control Loop.

use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq)]
pub enum ModeChangeReason {
    Manual,
    SteamTimeout,
}

impl ModeChangeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModeChangeReason::Manual => "manual",
            ModeChangeReason::SteamTimeout => "steam_timeout",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ModeChange {
        mode: &'static str,
        reason: ModeChangeReason,
    },
    MachineState {
        state: &'static str,
        updated_at: String,
    },
}

/// A small wrapper over `tokio::sync::broadcast` so publishers don't need
/// to think about "no subscribers" as an error.
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publishes an event. Returns silently if there are currently no
    /// subscribers — that is an expected, harmless state, not a failure.
    pub fn publish(&self, event: Event) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
