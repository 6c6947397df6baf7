//! Broadcast channel for pipeline events.
//!
//! Handlers publish lifecycle events here; any number of subscribers can
//! follow them. While the worker loop runs, [`EventBus::spawn_logger`] keeps
//! one subscriber attached that records every event at debug level.
//! Publishing never blocks and succeeds only while at least one subscriber
//! is attached.

use order_types::PipelineEvent;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Event bus shared by all handlers of an engine.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
	/// Creates a bus that buffers up to `capacity` events per lagging subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Publishes an event to every current subscriber.
	pub fn publish(
		&self,
		event: PipelineEvent,
	) -> Result<usize, broadcast::error::SendError<PipelineEvent>> {
		self.sender.send(event)
	}

	/// Subscribes to events published from now on.
	pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
		self.sender.subscribe()
	}

	/// Spawns a task that logs every published event until the bus closes.
	///
	/// The subscription is taken before this returns, so events published
	/// right after the call are not missed.
	pub fn spawn_logger(&self) -> JoinHandle<()> {
		let mut receiver = self.subscribe();
		tokio::spawn(async move {
			loop {
				match receiver.recv().await {
					Ok(event) => tracing::debug!(event = ?event, "Pipeline event"),
					Err(broadcast::error::RecvError::Lagged(count)) => {
						tracing::warn!(lagged_count = count, "Event logger lagged behind");
					},
					Err(broadcast::error::RecvError::Closed) => break,
				}
			}
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use order_types::IngestEvent;

	#[tokio::test]
	async fn test_logger_keeps_publishing_successful() {
		let bus = EventBus::new(8);
		let event = || {
			PipelineEvent::Ingest(IngestEvent::Stored {
				order_id: "ord-1".into(),
			})
		};
		assert!(bus.publish(event()).is_err());

		let logger = bus.spawn_logger();
		assert_eq!(bus.publish(event()).unwrap(), 1);

		logger.abort();
		assert!(logger.await.unwrap_err().is_cancelled());
	}

	#[tokio::test]
	async fn test_publish_reaches_subscribers() {
		let bus = EventBus::new(8);
		let mut receiver = bus.subscribe();

		bus.publish(PipelineEvent::Ingest(IngestEvent::Stored {
			order_id: "ord-1".into(),
		}))
		.unwrap();

		match receiver.recv().await.unwrap() {
			PipelineEvent::Ingest(IngestEvent::Stored { order_id }) => assert_eq!(order_id, "ord-1"),
			other => panic!("unexpected event: {:?}", other),
		}
	}

	#[test]
	fn test_publish_without_subscribers_fails() {
		let bus = EventBus::new(8);
		assert!(bus
			.publish(PipelineEvent::Ingest(IngestEvent::Stored {
				order_id: "ord-1".into(),
			}))
			.is_err());
	}
}
