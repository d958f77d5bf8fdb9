//! Broadcast event bus for `WorkflowEvent`.
//!
//! Publishing with no active subscribers is a no-op, so engines can always
//! emit events whether or not anyone is watching.

use stepwise_types::event::WorkflowEvent;
use tokio::sync::broadcast;

/// Default channel capacity for engine event buses.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Multi-consumer bus for workflow events.
///
/// Cloning the bus clones the sender; every clone feeds the same subscribers.
pub struct EventBus {
    sender: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Dropped silently when nobody is subscribed.
    pub fn publish(&self, event: WorkflowEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paused(execution_id: &str) -> WorkflowEvent {
        WorkflowEvent::RunPaused {
            execution_id: execution_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_published_event() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(paused("exec-1"));

        assert_eq!(rx1.recv().await.unwrap().execution_id(), "exec-1");
        assert_eq!(rx2.recv().await.unwrap().execution_id(), "exec-1");
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::default();
        bus.publish(paused("exec-1"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_lagging_receiver_reports_lag() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..5 {
            bus.publish(paused(&format!("exec-{i}")));
        }
        match rx.try_recv() {
            Err(broadcast::error::TryRecvError::Lagged(n)) => assert!(n > 0),
            other => panic!("expected lag, got {other:?}"),
        }
    }

    #[test]
    fn test_clones_share_one_channel() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.clone().publish(paused("exec-2"));
        assert_eq!(rx.try_recv().unwrap().execution_id(), "exec-2");
    }
}
