//! Fulfillment work queue module for the order pipeline.
//!
//! The queue decouples ingestion from fulfillment. Delivery is at-least-once:
//! a received message is hidden for a visibility timeout and reappears unless
//! it is acknowledged, with its receive count incremented on every receive.

use async_trait::async_trait;
use order_types::{ConfigSchema, Delivery, ImplementationRegistry};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod memory;
}

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
	/// The message referenced by a receipt handle is no longer in the queue.
	#[error("Message not found: {0}")]
	MessageNotFound(String),
	/// The receipt handle belongs to an earlier receive of the message.
	#[error("Stale receipt handle: {0}")]
	StaleReceipt(String),
	/// Error that occurs when encoding a message body.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the queue backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Point-in-time message counts of a queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
	/// Messages that can be received now.
	pub visible: usize,
	/// Messages received and not yet acknowledged or timed out.
	pub in_flight: usize,
	/// Messages moved aside after exceeding the transport's receive limit.
	pub redriven: usize,
}

/// Trait defining the interface for work queue backends.
#[async_trait]
pub trait QueueInterface: Send + Sync {
	/// Returns the configuration schema for this queue implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Appends a message and returns its transport identifier.
	async fn send(&self, body: String) -> Result<String, QueueError>;

	/// Receives up to `max_messages` visible messages.
	///
	/// Each returned message becomes invisible for `visibility_timeout` and its
	/// receive count is incremented.
	async fn receive(
		&self,
		max_messages: usize,
		visibility_timeout: Duration,
	) -> Result<Vec<Delivery>, QueueError>;

	/// Permanently removes the message received with `receipt_handle`.
	async fn ack(&self, receipt_handle: &str) -> Result<(), QueueError>;

	/// Returns current message counts.
	async fn stats(&self) -> Result<QueueStats, QueueError>;
}

/// Type alias for queue factory functions.
pub type QueueFactory = fn(&toml::Value) -> Result<Box<dyn QueueInterface>, QueueError>;

/// Registry trait for queue implementations.
pub trait QueueRegistry: ImplementationRegistry<Factory = QueueFactory> {}

/// Get all registered queue implementations.
pub fn get_all_implementations() -> Vec<(&'static str, QueueFactory)> {
	use implementations::memory;

	vec![(memory::Registry::NAME, memory::Registry::factory())]
}

/// Service wrapping a queue backend with typed enqueueing.
pub struct QueueService {
	backend: Box<dyn QueueInterface>,
}

impl QueueService {
	/// Creates a new QueueService with the specified backend.
	pub fn new(backend: Box<dyn QueueInterface>) -> Self {
		Self { backend }
	}

	/// Serializes `message` as JSON and appends it to the queue.
	pub async fn enqueue<T: Serialize>(&self, message: &T) -> Result<String, QueueError> {
		let body =
			serde_json::to_string(message).map_err(|e| QueueError::Serialization(e.to_string()))?;
		self.backend.send(body).await
	}

	/// Receives up to `max_messages` deliveries.
	pub async fn receive(
		&self,
		max_messages: usize,
		visibility_timeout: Duration,
	) -> Result<Vec<Delivery>, QueueError> {
		self.backend.receive(max_messages, visibility_timeout).await
	}

	/// Acknowledges a delivery so it is never delivered again.
	pub async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
		self.backend.ack(&delivery.receipt_handle).await
	}

	/// Returns current message counts.
	pub async fn stats(&self) -> Result<QueueStats, QueueError> {
		self.backend.stats().await
	}
}
