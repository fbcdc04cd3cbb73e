//! Profile change notifications
//!
//! UI code subscribes to a broadcast channel instead of being called back
//! from the engine. Slow subscribers lag and lose events; the engine never
//! waits for them.

use tokio::sync::broadcast;

use crate::error::ProfileError;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileEventKind {
    Added,
    Removed,
    /// Settings changed (enabled, title, interval) or index loaded from cache
    Modified,
    UpdateStarted,
    Updated { rules: usize },
    /// Downloaded content was identical to the current list
    Unchanged,
    UpdateFailed(ProfileError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileEvent {
    pub name: String,
    pub kind: ProfileEventKind,
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ProfileEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProfileEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, name: &str, kind: ProfileEventKind) {
        let _ = self.sender.send(ProfileEvent {
            name: name.to_string(),
            kind,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
