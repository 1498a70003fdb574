use tokio::sync::broadcast;

use crate::dto::events::ServerEvent;

/// Fan-out of room-scoped events to whoever presents the match.
pub trait Broadcaster: Send + Sync {
    /// Deliver `event` to every subscriber; delivery is best-effort.
    fn broadcast(&self, event: ServerEvent);
}

/// Broadcast hub shared by every match of the registry.
pub struct BroadcastHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl BroadcastHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }
}

impl Broadcaster for BroadcastHub {
    fn broadcast(&self, event: ServerEvent) {
        // No subscriber is not an error: events are not persisted.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_events_sent_after_subscribing() {
        let hub = BroadcastHub::new(4);
        hub.broadcast(ServerEvent {
            topic: "lost".into(),
            room: "ROOM01".into(),
            data: "{}".into(),
        });

        let mut rx = hub.subscribe();
        hub.broadcast(ServerEvent {
            topic: "kept".into(),
            room: "ROOM01".into(),
            data: "{}".into(),
        });

        assert_eq!(rx.try_recv().unwrap().topic, "kept");
        assert!(rx.try_recv().is_err());
    }
}
