//! Broadcast event bus for engine notifications.
//!
//! Fire-and-forget: publishing never blocks on consumers, and events for
//! which no subscriber exists are dropped. Consumers treat events purely
//! as refresh triggers and re-read the authoritative record.

use dispatch_types::DispatchEvent;
use tokio::sync::broadcast;

/// Cloneable handle on the engine's broadcast channel.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<DispatchEvent>,
}

impl EventBus {
	/// Creates a bus retaining up to `capacity` undelivered events per
	/// subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Publishes an event; with no subscribers the event is dropped.
	pub fn publish(&self, event: DispatchEvent) {
		let _ = self.sender.send(event);
	}

	/// Subscribes to events published after this call.
	pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
		self.sender.subscribe()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use dispatch_types::{OrderEvent, RouteEvent};

	#[tokio::test]
	async fn subscriber_receives_published_events() {
		let bus = EventBus::new(8);
		let mut rx = bus.subscribe();

		bus.publish(DispatchEvent::Route(RouteEvent::RouteUpdated {
			order_id: "ord_1".into(),
		}));

		match rx.recv().await.unwrap() {
			DispatchEvent::Route(RouteEvent::RouteUpdated { order_id }) => {
				assert_eq!(order_id, "ord_1")
			},
			other => panic!("unexpected event: {:?}", other),
		}
	}

	#[tokio::test]
	async fn publish_without_subscribers_does_not_panic() {
		let bus = EventBus::new(8);
		bus.publish(DispatchEvent::Order(OrderEvent::Submitted {
			order_id: "ord_1".into(),
		}));
	}
}
