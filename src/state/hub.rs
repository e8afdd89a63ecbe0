use tokio::sync::broadcast;

use crate::dto::sse::ServerEvent;

/// Broadcast hub fanning events out to every SSE and WebSocket subscriber.
pub struct EventHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl EventHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, returning how many received it.
    pub fn broadcast(&self, event: ServerEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events_sent_after_subscribing() {
        let hub = EventHub::new(4);
        assert_eq!(hub.broadcast(ServerEvent::new("dropped", serde_json::Value::Null)), 0);

        let mut receiver = hub.subscribe();
        let delivered = hub.broadcast(ServerEvent::new("race_data", serde_json::json!({})));
        assert_eq!(delivered, 1);
        assert_eq!(receiver.recv().await.unwrap().event, "race_data");
    }
}
