//! In-memory work queue with visibility timeouts.
//!
//! Messages stay in FIFO order. Receiving a message hides it until its
//! visibility deadline; acknowledging removes it. When `max_receive_count` is
//! configured, a message that has already been received that many times is
//! moved to a redrive list instead of being delivered again.

use crate::{QueueError, QueueFactory, QueueInterface, QueueRegistry, QueueStats};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use order_types::{ConfigSchema, Delivery, Field, FieldType, ImplementationRegistry, Schema, ValidationError};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::RwLock;

/// A message held by the queue together with its delivery bookkeeping.
#[derive(Debug, Clone)]
struct QueuedMessage {
	id: u64,
	body: String,
	enqueued_at: DateTime<Utc>,
	/// When the message becomes visible again (None = visible now)
	visible_at: Option<DateTime<Utc>>,
	receive_count: u32,
}

impl QueuedMessage {
	fn is_visible(&self, now: DateTime<Utc>) -> bool {
		self.visible_at.is_none_or(|at| at <= now)
	}

	fn receipt_handle(&self) -> String {
		format!("{}:{}", self.id, self.receive_count)
	}
}

#[derive(Debug, Default)]
struct QueueState {
	messages: VecDeque<QueuedMessage>,
	redriven: Vec<QueuedMessage>,
	next_id: u64,
}

/// In-memory queue implementation.
pub struct MemoryQueue {
	state: RwLock<QueueState>,
	/// Receive limit after which messages are redriven instead of delivered.
	max_receive_count: Option<u32>,
}

impl MemoryQueue {
	/// Creates an empty queue; `max_receive_count` enables redrive.
	pub fn new(max_receive_count: Option<u32>) -> Self {
		Self {
			state: RwLock::new(QueueState {
				next_id: 1,
				..QueueState::default()
			}),
			max_receive_count,
		}
	}

	/// Bodies of the messages moved aside by redrive, oldest first.
	pub async fn redriven_bodies(&self) -> Vec<String> {
		let state = self.state.read().await;
		state.redriven.iter().map(|m| m.body.clone()).collect()
	}
}

impl Default for MemoryQueue {
	fn default() -> Self {
		Self::new(None)
	}
}

#[async_trait]
impl QueueInterface for MemoryQueue {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryQueueSchema)
	}

	async fn send(&self, body: String) -> Result<String, QueueError> {
		let mut state = self.state.write().await;
		let id = state.next_id;
		state.next_id += 1;

		state.messages.push_back(QueuedMessage {
			id,
			body,
			enqueued_at: Utc::now(),
			visible_at: None,
			receive_count: 0,
		});

		Ok(format!("msg-{}", id))
	}

	async fn receive(
		&self,
		max_messages: usize,
		visibility_timeout: Duration,
	) -> Result<Vec<Delivery>, QueueError> {
		let timeout = chrono::Duration::from_std(visibility_timeout)
			.map_err(|e| QueueError::Backend(format!("Invalid visibility timeout: {}", e)))?;

		let mut state = self.state.write().await;
		let now = Utc::now();
		let visible_until = now + timeout;
		let mut received = Vec::new();
		let mut index = 0;

		while index < state.messages.len() && received.len() < max_messages {
			let message = &state.messages[index];
			if !message.is_visible(now) {
				index += 1;
				continue;
			}

			if self
				.max_receive_count
				.is_some_and(|limit| message.receive_count >= limit)
			{
				if let Some(message) = state.messages.remove(index) {
					tracing::warn!(
						message_id = message.id,
						receive_count = message.receive_count,
						"Message exceeded receive limit, redriving"
					);
					state.redriven.push(message);
				}
				continue;
			}

			let message = &mut state.messages[index];
			message.visible_at = Some(visible_until);
			message.receive_count += 1;

			received.push(Delivery {
				message_id: format!("msg-{}", message.id),
				receipt_handle: message.receipt_handle(),
				body: message.body.clone(),
				receive_count: message.receive_count,
				enqueued_at: message.enqueued_at,
			});
			index += 1;
		}

		Ok(received)
	}

	async fn ack(&self, receipt_handle: &str) -> Result<(), QueueError> {
		let (id, receive_count) = receipt_handle
			.split_once(':')
			.and_then(|(id, count)| Some((id.parse::<u64>().ok()?, count.parse::<u32>().ok()?)))
			.ok_or_else(|| QueueError::MessageNotFound(receipt_handle.to_string()))?;

		let mut state = self.state.write().await;
		let position = state
			.messages
			.iter()
			.position(|m| m.id == id)
			.ok_or_else(|| QueueError::MessageNotFound(receipt_handle.to_string()))?;

		if state.messages[position].receive_count != receive_count {
			return Err(QueueError::StaleReceipt(receipt_handle.to_string()));
		}

		state.messages.remove(position);
		Ok(())
	}

	async fn stats(&self) -> Result<QueueStats, QueueError> {
		let state = self.state.read().await;
		let now = Utc::now();
		let visible = state.messages.iter().filter(|m| m.is_visible(now)).count();

		Ok(QueueStats {
			visible,
			in_flight: state.messages.len() - visible,
			redriven: state.redriven.len(),
		})
	}
}

/// Configuration schema for MemoryQueue.
pub struct MemoryQueueSchema;

impl ConfigSchema for MemoryQueueSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![Field::new(
				"max_receive_count",
				FieldType::Integer {
					min: Some(1),
					max: Some(i64::from(u32::MAX)),
				},
			)],
		);
		schema.validate(config)
	}
}

/// Factory function to create a memory queue from configuration.
///
/// Configuration parameters:
/// - `max_receive_count`: optional transport-level redrive limit
pub fn create_queue(config: &toml::Value) -> Result<Box<dyn QueueInterface>, QueueError> {
	MemoryQueueSchema
		.validate(config)
		.map_err(|e| QueueError::Configuration(e.to_string()))?;

	let max_receive_count = config
		.get("max_receive_count")
		.and_then(|v| v.as_integer())
		.and_then(|v| u32::try_from(v).ok());

	Ok(Box::new(MemoryQueue::new(max_receive_count)))
}

/// Registry for the memory queue implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = QueueFactory;

	fn factory() -> Self::Factory {
		create_queue
	}
}

impl QueueRegistry for Registry {}
