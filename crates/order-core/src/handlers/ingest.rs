//! Ingestion handler: validate, store and enqueue new orders.
//!
//! Runs the two orchestration stages for one order document. A document that
//! fails validation is returned as a [`RejectedOrder`] and never touches the
//! store; a valid one is persisted as PENDING_FULFILLMENT and placed on the
//! fulfillment queue.

use crate::engine::event_bus::EventBus;
use crate::state::OrderStore;
use crate::validator;
use order_queue::QueueService;
use order_types::{
	current_timestamp, truncate_id, IngestEvent, Order, OrderStatus, PipelineEvent,
	RejectedOrder, ValidationStatus,
};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur during ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
	#[error("Request body is required")]
	EmptyBody,
	#[error("Document error: {0}")]
	Document(String),
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Queue error: {0}")]
	Queue(String),
}

/// Result of a completed ingestion run.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
	/// The order was stored and enqueued for fulfillment.
	Pending(Order),
	/// The order failed validation; nothing was stored.
	Rejected(RejectedOrder),
}

/// Handler for the validate and store stages.
pub struct IngestHandler {
	order_store: Arc<OrderStore>,
	queue: Arc<QueueService>,
	event_bus: EventBus,
}

impl IngestHandler {
	pub fn new(order_store: Arc<OrderStore>, queue: Arc<QueueService>, event_bus: EventBus) -> Self {
		Self {
			order_store,
			queue,
			event_bus,
		}
	}

	/// Builds the initial order document from a request body.
	///
	/// Assigns a fresh `order_id`, stamps the acceptance time and sets the
	/// status to INITIATED. Only the known order fields are taken from the
	/// body; `items` defaults to an empty list. Empty or non-object bodies
	/// are rejected.
	pub fn normalize(body: &Value) -> Result<Value, IngestError> {
		let fields = body
			.as_object()
			.filter(|fields| !fields.is_empty())
			.ok_or(IngestError::EmptyBody)?;

		Ok(json!({
			"order_id": uuid::Uuid::new_v4().to_string(),
			"customer_id": fields.get("customer_id").cloned().unwrap_or(Value::Null),
			"items": fields.get("items").cloned().unwrap_or_else(|| json!([])),
			"total_amount": fields.get("total_amount").cloned().unwrap_or(Value::Null),
			"timestamp": current_timestamp(),
			"status": OrderStatus::Initiated,
		}))
	}

	/// Validates, stores and enqueues a normalized order document.
	#[instrument(skip_all, fields(order_id = %truncate_id(document_id(&document))))]
	pub async fn ingest(&self, mut document: Value) -> Result<IngestOutcome, IngestError> {
		let order_id = document_id(&document).to_string();
		tracing::info!(event_type = "validation_started", "Validating order");

		let errors = validator::validate(&document);
		if !errors.is_empty() {
			tracing::error!(
				event_type = "validation_failed",
				errors = ?errors,
				"Order failed validation"
			);
			self.event_bus
				.publish(PipelineEvent::Ingest(IngestEvent::Rejected {
					order_id: order_id.clone(),
					errors: errors.clone(),
				}))
				.ok();

			return Ok(IngestOutcome::Rejected(RejectedOrder {
				order_id,
				status: OrderStatus::ValidationFailed,
				validation_status: ValidationStatus::Failed,
				validation_errors: errors,
				timestamp: current_timestamp(),
				document,
			}));
		}

		if let Some(fields) = document.as_object_mut() {
			fields.insert("validation_status".into(), json!(ValidationStatus::Passed));
			fields.insert("validated_at".into(), json!(current_timestamp()));
		}
		tracing::info!(event_type = "validation_successful", "Order validated");

		let order =
			Order::from_document(&document).map_err(|e| IngestError::Document(e.to_string()))?;
		let stored = self
			.order_store
			.persist(order)
			.await
			.map_err(|e| IngestError::Storage(e.to_string()))?;
		tracing::info!(event_type = "order_stored_successfully", "Order stored");

		let message_id = self
			.queue
			.enqueue(&stored)
			.await
			.map_err(|e| IngestError::Queue(e.to_string()))?;
		tracing::info!(
			event_type = "order_enqueued",
			message_id = %message_id,
			"Order queued for fulfillment"
		);

		self.event_bus
			.publish(PipelineEvent::Ingest(IngestEvent::Stored { order_id }))
			.ok();

		Ok(IngestOutcome::Pending(stored))
	}
}

fn document_id(document: &Value) -> &str {
	document
		.get("order_id")
		.and_then(Value::as_str)
		.unwrap_or("unknown")
}
