//! Order store gateway and lifecycle state machine.
//!
//! Orders move through INITIATED -> PENDING_FULFILLMENT -> FULFILLED, with
//! FAILED as a retryable intermediate status and DEAD_LETTERED as the
//! terminal status of orders that exhausted their retry budget. Status
//! updates are narrow: only `status` and `updated_at` are written back, so
//! fields added by other writers survive.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use once_cell::sync::Lazy;
use order_config::StorageConfig;
use order_storage::{StorageError, StorageService};
use order_types::{
	current_timestamp, expiry_timestamp, ExecutionRecord, Order, OrderStatus, QuarantinedOrder,
	StorageStatus,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during order state management.
#[derive(Debug, Error)]
pub enum OrderStoreError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Order not found: {0}")]
	NotFound(String),
	#[error("Invalid state transition from {from} to {to}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	#[error("Serialization error: {0}")]
	Serialization(String),
}

impl OrderStoreError {
	fn from_storage(err: StorageError, id: &str) -> Self {
		match err {
			StorageError::NotFound => OrderStoreError::NotFound(id.to_string()),
			StorageError::Serialization(e) => OrderStoreError::Serialization(e),
			other => OrderStoreError::Storage(other.to_string()),
		}
	}
}

/// Static transition table - each status maps to the statuses it may move to.
static TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
	let mut m = HashMap::new();
	m.insert(
		OrderStatus::Initiated,
		HashSet::from([OrderStatus::ValidationFailed, OrderStatus::PendingFulfillment]),
	);
	m.insert(
		OrderStatus::PendingFulfillment,
		HashSet::from([
			OrderStatus::PendingFulfillment,
			OrderStatus::Fulfilled,
			OrderStatus::Failed,
		]),
	);
	m.insert(
		OrderStatus::Failed,
		HashSet::from([
			OrderStatus::PendingFulfillment,
			OrderStatus::Fulfilled,
			OrderStatus::Failed,
			OrderStatus::DeadLettered,
		]),
	);
	m.insert(OrderStatus::Fulfilled, HashSet::new()); // terminal
	m.insert(OrderStatus::DeadLettered, HashSet::new()); // terminal
	m.insert(OrderStatus::ValidationFailed, HashSet::new()); // terminal
	m
});

/// Persists orders, quarantine records and execution records, and enforces
/// the order lifecycle on every status change.
pub struct OrderStore {
	storage: Arc<StorageService>,
	orders_store: String,
	dead_letter_store: String,
	executions_store: String,
	order_ttl: ChronoDuration,
	quarantine_ttl: ChronoDuration,
}

impl OrderStore {
	/// Creates a gateway over `storage` using the namespaces and retention
	/// periods from the storage configuration.
	pub fn new(storage: Arc<StorageService>, config: &StorageConfig) -> Self {
		Self {
			storage,
			orders_store: config.orders_store.clone(),
			dead_letter_store: config.dead_letter_store.clone(),
			executions_store: config.executions_store.clone(),
			order_ttl: ChronoDuration::days(config.order_ttl_days as i64),
			quarantine_ttl: ChronoDuration::days(config.quarantine_ttl_days as i64),
		}
	}

	/// Checks if a status transition is valid.
	pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
		TRANSITIONS.get(&from).is_some_and(|set| set.contains(&to))
	}

	/// Retention applied to quarantine records.
	pub fn quarantine_ttl(&self) -> ChronoDuration {
		self.quarantine_ttl
	}

	/// Stamps the storage stage annotations on `order` and upserts it.
	///
	/// Re-persisting an order overwrites the previous record.
	pub async fn persist(&self, mut order: Order) -> Result<Order, OrderStoreError> {
		let now = current_timestamp();
		order.stored_at = Some(now);
		order.storage_status = Some(StorageStatus::Stored);
		order.status = OrderStatus::PendingFulfillment;
		order.ttl = Some(expiry_timestamp(now, self.order_ttl));

		self.storage
			.store_with_ttl(
				&self.orders_store,
				&order.order_id,
				&order,
				Some(to_std(self.order_ttl)),
			)
			.await
			.map_err(|e| OrderStoreError::from_storage(e, &order.order_id))?;

		tracing::debug!(order_id = %order.order_id, "Order persisted");
		Ok(order)
	}

	/// Gets an order by ID.
	pub async fn get_order(&self, order_id: &str) -> Result<Order, OrderStoreError> {
		self.storage
			.retrieve(&self.orders_store, order_id)
			.await
			.map_err(|e| OrderStoreError::from_storage(e, order_id))
	}

	/// Transitions an order to a new status with validation.
	///
	/// Only `status` and `updated_at` are sent to the store, which merges them
	/// into the stored document; fields written concurrently by others are
	/// kept. Re-applying a terminal status is a no-op that returns the stored
	/// order.
	pub async fn update_status(
		&self,
		order_id: &str,
		new_status: OrderStatus,
	) -> Result<Order, OrderStoreError> {
		let document = self
			.storage
			.retrieve_document(&self.orders_store, order_id)
			.await
			.map_err(|e| OrderStoreError::from_storage(e, order_id))?;

		let current: OrderStatus = document
			.get("status")
			.and_then(Value::as_str)
			.ok_or_else(|| {
				OrderStoreError::Serialization(format!("Order {} has no status", order_id))
			})?
			.parse()
			.map_err(OrderStoreError::Serialization)?;

		if current == new_status && current.is_terminal() {
			return decode_order(document);
		}

		if !Self::is_valid_transition(current, new_status) {
			return Err(OrderStoreError::InvalidTransition {
				from: current,
				to: new_status,
			});
		}

		let now = current_timestamp();
		let updated_at = match document.get("updated_at").and_then(parse_timestamp) {
			Some(previous) if previous > now => previous,
			_ => now,
		};

		let mut fields = serde_json::Map::new();
		fields.insert("status".into(), Value::String(new_status.as_str().to_string()));
		fields.insert("updated_at".into(), Value::String(updated_at.to_rfc3339()));

		let updated = self
			.storage
			.update_fields(&self.orders_store, order_id, fields)
			.await
			.map_err(|e| OrderStoreError::from_storage(e, order_id))?;

		tracing::debug!(order_id = %order_id, from = %current, to = %new_status, "Order status updated");
		decode_order(updated)
	}

	/// Writes a quarantine record unless one already exists.
	///
	/// Returns `false` when the order was already quarantined; the existing
	/// record is never modified.
	pub async fn quarantine(&self, record: &QuarantinedOrder) -> Result<bool, OrderStoreError> {
		self.storage
			.store_if_absent(
				&self.dead_letter_store,
				&record.order_id,
				record,
				Some(to_std(self.quarantine_ttl)),
			)
			.await
			.map_err(|e| OrderStoreError::from_storage(e, &record.order_id))
	}

	/// Gets the quarantine record of an order.
	pub async fn get_quarantined(&self, order_id: &str) -> Result<QuarantinedOrder, OrderStoreError> {
		self.storage
			.retrieve(&self.dead_letter_store, order_id)
			.await
			.map_err(|e| OrderStoreError::from_storage(e, order_id))
	}

	/// Returns true when a quarantine record exists for the order.
	pub async fn is_quarantined(&self, order_id: &str) -> Result<bool, OrderStoreError> {
		self.storage
			.exists(&self.dead_letter_store, order_id)
			.await
			.map_err(|e| OrderStoreError::from_storage(e, order_id))
	}

	/// Upserts an execution record.
	pub async fn save_execution(&self, record: &ExecutionRecord) -> Result<(), OrderStoreError> {
		self.storage
			.store_with_ttl(
				&self.executions_store,
				&record.execution_reference,
				record,
				Some(to_std(self.order_ttl)),
			)
			.await
			.map_err(|e| OrderStoreError::from_storage(e, &record.execution_reference))
	}

	/// Gets an execution record by its reference.
	pub async fn get_execution(&self, reference: &str) -> Result<ExecutionRecord, OrderStoreError> {
		self.storage
			.retrieve(&self.executions_store, reference)
			.await
			.map_err(|e| OrderStoreError::from_storage(e, reference))
	}
}

fn decode_order(document: Value) -> Result<Order, OrderStoreError> {
	serde_json::from_value(document).map_err(|e| OrderStoreError::Serialization(e.to_string()))
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
	serde_json::from_value(value.clone()).ok()
}

fn to_std(duration: ChronoDuration) -> Duration {
	duration.to_std().unwrap_or(Duration::ZERO)
}
