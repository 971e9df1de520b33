//! Lifecycle events.
//!
//! Events are plain enum messages on a broadcast channel. A subscriber that
//! falls behind loses the oldest events (`RecvError::Lagged`); publishers
//! never block.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::domains::submissions::Submission;

/// Default number of buffered events per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum LifecycleEvent {
    /// A protocol became active, possibly replacing `previous_version`.
    #[serde(rename_all = "camelCase")]
    ProtocolLoaded {
        name: String,
        version: String,
        tools: Vec<String>,
        previous_version: Option<String>,
    },

    /// A protocol and exactly these tools were removed.
    ProtocolUnloaded { name: String, tools: Vec<String> },

    /// Loading or reloading failed.
    ProtocolError {
        name: Option<String>,
        origin: String,
        errors: Vec<String>,
    },

    /// A pull-request submission finished processing.
    SubmissionProcessed(Submission),
}

impl LifecycleEvent {
    /// Wire name, e.g. `protocol:loaded`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ProtocolLoaded { .. } => "protocol:loaded",
            Self::ProtocolUnloaded { .. } => "protocol:unloaded",
            Self::ProtocolError { .. } => "protocol:error",
            Self::SubmissionProcessed(_) => "submission:processed",
        }
    }
}

/// Fan-out of lifecycle events to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to current subscribers. Returns how many received it.
    pub fn publish(&self, event: LifecycleEvent) -> usize {
        let name = event.name();
        let delivered = self.sender.send(event).unwrap_or(0);
        trace!(event = name, delivered, "Published lifecycle event");
        delivered
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unloaded(name: &str) -> LifecycleEvent {
        LifecycleEvent::ProtocolUnloaded {
            name: name.to_string(),
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_events() {
        let bus = EventBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.publish(unloaded("a")), 2);
        assert_eq!(first.recv().await.unwrap(), unloaded("a"));
        assert_eq!(second.recv().await.unwrap().name(), "protocol:unloaded");
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        assert_eq!(EventBus::default().publish(unloaded("a")), 0);
    }

    #[test]
    fn test_wire_names() {
        let error = LifecycleEvent::ProtocolError {
            name: None,
            origin: "inline".to_string(),
            errors: vec![],
        };
        assert_eq!(error.name(), "protocol:error");
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["event"], "protocolError");
    }
}
