//! Core engine that drives orders through the pipeline.
//!
//! This module contains the OrderEngine, which accepts new orders for
//! ingestion, runs the fulfillment worker loop against the queue and owns
//! the background storage cleanup task.

pub mod event_bus;
pub mod lifecycle;

use crate::handlers::{FulfillmentHandler, IngestError, IngestHandler, IngestOutcome};
use crate::state::OrderStore;
use order_config::Config;
use order_fulfillment::FulfillmentService;
use order_queue::QueueService;
use order_storage::StorageService;
use order_types::{
	current_timestamp, truncate_id, Delivery, DeliveryDisposition, ExecutionRecord,
	ExecutionState, IngestEvent, PipelineEvent,
};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
	#[error("Handler error: {0}")]
	Handler(String),
}

/// Identifiers handed back to the caller when an order is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReceipt {
	pub order_id: String,
	pub execution_reference: String,
}

/// Main engine that orchestrates the order lifecycle.
#[derive(Clone)]
pub struct OrderEngine {
	/// Pipeline configuration.
	pub(crate) config: Config,
	/// Storage service shared by all stores.
	pub(crate) storage: Arc<StorageService>,
	/// Fulfillment work queue.
	pub(crate) queue: Arc<QueueService>,
	/// Order store gateway
	pub(crate) order_store: Arc<OrderStore>,
	/// Event bus for lifecycle events.
	pub(crate) event_bus: event_bus::EventBus,
	pub(crate) ingest_handler: Arc<IngestHandler>,
	pub(crate) fulfillment_handler: Arc<FulfillmentHandler>,
}

impl OrderEngine {
	/// Creates a new engine and wires its handlers.
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		queue: Arc<QueueService>,
		fulfillment: Arc<FulfillmentService>,
		event_bus: event_bus::EventBus,
	) -> Self {
		let order_store = Arc::new(OrderStore::new(storage.clone(), &config.storage));
		let ingest_handler = Arc::new(IngestHandler::new(
			order_store.clone(),
			queue.clone(),
			event_bus.clone(),
		));
		let fulfillment_handler = Arc::new(FulfillmentHandler::new(
			order_store.clone(),
			fulfillment,
			event_bus.clone(),
		));

		Self {
			config,
			storage,
			queue,
			order_store,
			event_bus,
			ingest_handler,
			fulfillment_handler,
		}
	}

	/// Accepts an order request and starts its ingestion in the background.
	///
	/// Returns as soon as the execution record is written. The outcome of
	/// validation and storage is recorded on the execution record and
	/// published on the event bus.
	pub async fn submit(&self, body: &Value) -> Result<IngestReceipt, IngestError> {
		let document = IngestHandler::normalize(body)?;
		let order_id = document
			.get("order_id")
			.and_then(Value::as_str)
			.unwrap_or_default()
			.to_string();

		let execution = ExecutionRecord::start(&order_id, current_timestamp());
		self.order_store
			.save_execution(&execution)
			.await
			.map_err(|e| IngestError::Storage(e.to_string()))?;

		tracing::info!(
			order_id = %truncate_id(&order_id),
			event_type = "order_received",
			execution_reference = %execution.execution_reference,
			"Order received"
		);
		self.event_bus
			.publish(PipelineEvent::Ingest(IngestEvent::Received {
				order_id: order_id.clone(),
				execution_reference: execution.execution_reference.clone(),
			}))
			.ok();

		let receipt = IngestReceipt {
			order_id,
			execution_reference: execution.execution_reference.clone(),
		};

		let engine = self.clone();
		tokio::spawn(async move {
			engine.complete_execution(execution, document).await;
		});

		Ok(receipt)
	}

	async fn complete_execution(&self, mut execution: ExecutionRecord, document: Value) {
		match self.ingest_handler.ingest(document).await {
			Ok(IngestOutcome::Pending(_)) => {
				execution.state = ExecutionState::Succeeded;
			},
			Ok(IngestOutcome::Rejected(rejected)) => {
				execution.state = ExecutionState::Failed;
				execution.errors = rejected.validation_errors;
			},
			Err(e) => {
				tracing::error!(
					order_id = %truncate_id(&execution.order_id),
					event_type = "ingestion_error",
					error = %e,
					"Order ingestion failed"
				);
				self.event_bus
					.publish(PipelineEvent::Ingest(IngestEvent::Failed {
						order_id: execution.order_id.clone(),
						error: e.to_string(),
					}))
					.ok();
				execution.state = ExecutionState::Failed;
				execution.errors = vec![e.to_string()];
			},
		}
		execution.finished_at = Some(current_timestamp());

		if let Err(e) = self.order_store.save_execution(&execution).await {
			tracing::error!(
				execution_reference = %execution.execution_reference,
				error = %e,
				"Failed to record execution outcome"
			);
		}
	}

	/// Main execution loop. Runs until Ctrl+C is received.
	pub async fn run(&self) -> Result<(), EngineError> {
		self.run_until(async {
			if let Err(e) = tokio::signal::ctrl_c().await {
				tracing::error!("Failed to listen for shutdown signal: {}", e);
			}
		})
		.await
	}

	/// Runs the worker loop until `shutdown` completes.
	///
	/// Deliveries are handled concurrently up to `engine.max_concurrent_tasks`.
	/// In-flight handlers are awaited before returning.
	pub async fn run_until<S>(&self, shutdown: S) -> Result<(), EngineError>
	where
		S: Future<Output = ()>,
	{
		let max_tasks = self.config.engine.max_concurrent_tasks;
		let permits = u32::try_from(max_tasks)
			.map_err(|_| EngineError::Config(format!("max_concurrent_tasks too large: {}", max_tasks)))?;

		// Start storage cleanup task
		let storage = self.storage.clone();
		let cleanup_interval = tokio::time::interval(Duration::from_secs(
			self.config.storage.cleanup_interval_seconds,
		));
		let cleanup_handle = tokio::spawn(async move {
			let mut interval = cleanup_interval;
			loop {
				interval.tick().await;
				match storage.cleanup_expired().await {
					Ok(count) if count > 0 => {
						tracing::debug!("Storage cleanup: removed {} expired entries", count);
					},
					Err(e) => {
						tracing::warn!("Storage cleanup failed: {}", e);
					},
					_ => {},
				}
			}
		});

		let event_logger = self.event_bus.spawn_logger();

		let semaphore = Arc::new(Semaphore::new(max_tasks));
		let batch_size = self.config.queue.batch_size;
		let visibility_timeout = Duration::from_secs(self.config.queue.visibility_timeout_seconds);
		let poll_interval = Duration::from_millis(self.config.queue.poll_interval_ms);
		tokio::pin!(shutdown);

		loop {
			tokio::select! {
				received = self.queue.receive(batch_size, visibility_timeout) => {
					match received {
						Ok(deliveries) if deliveries.is_empty() => {
							tokio::time::sleep(poll_interval).await;
						},
						Ok(deliveries) => {
							for delivery in deliveries {
								self.spawn_handler(&semaphore, move |engine| async move {
									engine.dispatch(delivery).await;
									Ok(())
								})
								.await;
							}
						},
						Err(e) => {
							tracing::warn!("Failed to receive from queue: {}", e);
							tokio::time::sleep(poll_interval).await;
						},
					}
				}

				// Shutdown signal
				_ = &mut shutdown => {
					break;
				}
			}
		}

		// Cleanup
		cleanup_handle.abort();
		if let Err(e) = semaphore.acquire_many(permits).await {
			tracing::warn!("Failed to drain in-flight handlers: {}", e);
		}
		event_logger.abort();

		Ok(())
	}

	/// Receives one batch from the queue and handles it inline.
	///
	/// Returns the disposition of every delivery in receive order.
	pub async fn process_batch(&self) -> Result<Vec<DeliveryDisposition>, EngineError> {
		let deliveries = self
			.queue
			.receive(
				self.config.queue.batch_size,
				Duration::from_secs(self.config.queue.visibility_timeout_seconds),
			)
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;

		let mut dispositions = Vec::with_capacity(deliveries.len());
		for delivery in deliveries {
			dispositions.push(self.dispatch(delivery).await);
		}
		Ok(dispositions)
	}

	/// Handles one delivery and acknowledges it when processing is finished.
	async fn dispatch(&self, delivery: Delivery) -> DeliveryDisposition {
		let disposition = self.fulfillment_handler.handle(&delivery).await;
		if disposition.should_ack() {
			if let Err(e) = self.queue.ack(&delivery).await {
				tracing::warn!(
					message_id = %delivery.message_id,
					error = %e,
					"Failed to acknowledge delivery"
				);
			}
		}
		disposition
	}

	/// Returns a reference to the event bus.
	pub fn event_bus(&self) -> &event_bus::EventBus {
		&self.event_bus
	}

	/// Returns a reference to the configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Returns a reference to the order store gateway.
	pub fn order_store(&self) -> &Arc<OrderStore> {
		&self.order_store
	}

	/// Returns a reference to the fulfillment queue.
	pub fn queue(&self) -> &Arc<QueueService> {
		&self.queue
	}

	/// Helper method to spawn handler tasks with semaphore-based concurrency control.
	async fn spawn_handler<F, Fut>(&self, semaphore: &Arc<Semaphore>, handler: F)
	where
		F: FnOnce(OrderEngine) -> Fut + Send + 'static,
		Fut: Future<Output = Result<(), EngineError>> + Send,
	{
		let engine = self.clone();
		match semaphore.clone().acquire_owned().await {
			Ok(permit) => {
				tokio::spawn(async move {
					let _permit = permit; // Keep permit alive for duration of task
					if let Err(e) = handler(engine).await {
						tracing::error!("Handler error: {}", e);
					}
				});
			},
			Err(e) => {
				tracing::error!("Failed to acquire semaphore permit: {}", e);
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::builder::OrderEngineBuilder;
	use crate::test_support::{factories, order_body, scripted};
	use order_config::ConfigBuilder;
	use order_types::{AckReason, FulfillmentEvent, OrderStatus, QUARANTINE_REASON};
	use serde_json::json;

	async fn engine_with(outcomes: &[&str], visibility_timeout_seconds: u64) -> OrderEngine {
		let config = ConfigBuilder::new()
			.visibility_timeout_seconds(visibility_timeout_seconds)
			.fulfillment("scripted", scripted(outcomes))
			.max_receive_count(3)
			.build();
		OrderEngineBuilder::new(config)
			.build(factories())
			.await
			.unwrap()
	}

	// Zero visibility makes unacknowledged messages visible to the next batch.
	async fn engine(outcomes: &[&str]) -> OrderEngine {
		engine_with(outcomes, 0).await
	}

	async fn wait_for_execution(engine: &OrderEngine, reference: &str) -> ExecutionRecord {
		for _ in 0..200 {
			let record = engine
				.order_store()
				.get_execution(reference)
				.await
				.unwrap();
			if record.state != ExecutionState::Running {
				return record;
			}
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
		panic!("execution {} did not finish", reference);
	}

	#[tokio::test]
	async fn test_successful_order_is_fulfilled() {
		let engine = engine(&["succeed"]).await;

		let receipt = engine.submit(&order_body()).await.unwrap();
		assert!(receipt
			.execution_reference
			.starts_with(&format!("order-{}-", receipt.order_id)));

		let execution = wait_for_execution(&engine, &receipt.execution_reference).await;
		assert_eq!(execution.state, ExecutionState::Succeeded);
		assert!(execution.finished_at.is_some());
		assert_eq!(
			engine
				.order_store()
				.get_order(&receipt.order_id)
				.await
				.unwrap()
				.status,
			OrderStatus::PendingFulfillment
		);

		let dispositions = engine.process_batch().await.unwrap();
		assert_eq!(
			dispositions,
			vec![DeliveryDisposition::Acked {
				order_id: receipt.order_id.clone(),
				reason: AckReason::Fulfilled
			}]
		);
		assert_eq!(
			engine
				.order_store()
				.get_order(&receipt.order_id)
				.await
				.unwrap()
				.status,
			OrderStatus::Fulfilled
		);
		assert!(!engine
			.order_store()
			.is_quarantined(&receipt.order_id)
			.await
			.unwrap());
		assert!(engine.process_batch().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_exhausted_order_is_quarantined() {
		let engine = engine(&["fail", "fail", "fail"]).await;
		let receipt = engine.submit(&order_body()).await.unwrap();
		wait_for_execution(&engine, &receipt.execution_reference).await;

		let first = engine.process_batch().await.unwrap();
		assert!(matches!(
			first.as_slice(),
			[DeliveryDisposition::RequestRedelivery { receive_count: 1, .. }]
		));
		let second = engine.process_batch().await.unwrap();
		assert!(matches!(
			second.as_slice(),
			[DeliveryDisposition::RequestRedelivery { receive_count: 2, .. }]
		));
		let third = engine.process_batch().await.unwrap();
		assert_eq!(
			third,
			vec![DeliveryDisposition::Acked {
				order_id: receipt.order_id.clone(),
				reason: AckReason::Quarantined
			}]
		);
		assert!(engine.process_batch().await.unwrap().is_empty());

		let store = engine.order_store();
		let live = store.get_order(&receipt.order_id).await.unwrap();
		assert_eq!(live.status, OrderStatus::Failed);

		let record = store.get_quarantined(&receipt.order_id).await.unwrap();
		assert_eq!(record.status, OrderStatus::DeadLettered);
		assert_eq!(record.failure_reason, QUARANTINE_REASON);
		assert_eq!(record.receive_count, 3);
		assert_eq!(record.original_order.order_id, receipt.order_id);
	}

	#[tokio::test]
	async fn test_invalid_order_is_rejected() {
		let engine = engine(&[]).await;
		let body = json!({"customer_id": "cust-1", "items": [], "total_amount": 10});

		let receipt = engine.submit(&body).await.unwrap();
		let execution = wait_for_execution(&engine, &receipt.execution_reference).await;

		assert_eq!(execution.state, ExecutionState::Failed);
		assert_eq!(
			execution.errors,
			vec![
				"Missing required field: items",
				"Order must contain at least one item",
			]
		);
		assert!(engine
			.order_store()
			.get_order(&receipt.order_id)
			.await
			.is_err());
		assert!(engine.process_batch().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_empty_body_is_refused() {
		let engine = engine(&[]).await;
		assert!(matches!(
			engine.submit(&json!({})).await,
			Err(IngestError::EmptyBody)
		));
	}

	#[tokio::test]
	async fn test_run_until_processes_queue() {
		let engine = engine_with(&["fail", "succeed"], 1).await;
		let mut events = engine.event_bus().subscribe();
		let receipt = engine.submit(&order_body()).await.unwrap();

		let worker = engine.clone();
		let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
		let handle = tokio::spawn(async move {
			worker
				.run_until(async {
					stop_rx.await.ok();
				})
				.await
		});

		let fulfilled = tokio::time::timeout(Duration::from_secs(5), async {
			loop {
				if let Ok(PipelineEvent::Fulfillment(FulfillmentEvent::Fulfilled { order_id })) =
					events.recv().await
				{
					break order_id;
				}
			}
		})
		.await
		.unwrap();
		assert_eq!(fulfilled, receipt.order_id);

		stop_tx.send(()).unwrap();
		handle.await.unwrap().unwrap();
		assert_eq!(
			engine
				.order_store()
				.get_order(&receipt.order_id)
				.await
				.unwrap()
				.status,
			OrderStatus::Fulfilled
		);
	}
}
