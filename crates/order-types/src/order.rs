//! Order processing types for the fulfillment pipeline.
//!
//! This module defines the order record that flows through ingestion,
//! storage and fulfillment, its lifecycle status, and the records produced
//! when an order is rejected at validation or quarantined after exhausting
//! its retry budget.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when converting a boundary document into an [`Order`].
#[derive(Debug, Error, PartialEq)]
pub enum DocumentError {
	/// A required field is absent or null.
	#[error("Missing field: {0}")]
	MissingField(String),
	/// A field is present but cannot be represented in the typed record.
	#[error("Invalid field '{field}': {message}")]
	InvalidField { field: String, message: String },
}

/// Represents a customer order with its lifecycle state.
///
/// Each pipeline stage passes the full record through and adds its own
/// annotations (`validation_status`, `stored_at`, ...), so the record held
/// by the store always carries the history of the stages it went through.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
	/// Unique identifier assigned at ingestion; primary key in the store.
	pub order_id: String,
	/// Opaque identifier of the requesting customer.
	pub customer_id: String,
	/// Ordered line items; never empty for a validated order.
	pub items: Vec<LineItem>,
	/// Total amount of the order, kept as an exact decimal.
	pub total_amount: Decimal,
	/// Current lifecycle status.
	pub status: OrderStatus,
	/// Time the order was accepted at ingestion.
	pub timestamp: DateTime<Utc>,
	/// Outcome of the validation stage.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub validation_status: Option<ValidationStatus>,
	/// Time the validation stage passed the order.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub validated_at: Option<DateTime<Utc>>,
	/// Outcome of the storage stage.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub storage_status: Option<StorageStatus>,
	/// Time the order was persisted.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stored_at: Option<DateTime<Utc>>,
	/// Time of the last status update.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub updated_at: Option<DateTime<Utc>>,
	/// Unix-seconds expiry marker used by the store for garbage collection.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ttl: Option<i64>,
}

impl Order {
	/// Builds a typed order from a boundary document that passed validation.
	///
	/// Monetary and quantity fields are parsed directly into exact decimals.
	/// Stage annotations already present on the document are carried over.
	pub fn from_document(document: &Value) -> Result<Self, DocumentError> {
		let order_id = string_field(document, "order_id")?;
		let customer_id = string_field(document, "customer_id")?;
		let items = document
			.get("items")
			.and_then(Value::as_array)
			.ok_or_else(|| DocumentError::MissingField("items".into()))?
			.iter()
			.enumerate()
			.map(|(index, item)| LineItem::from_document(index, item))
			.collect::<Result<Vec<_>, _>>()?;
		let total_amount = decimal_field(document, "total_amount", "total_amount")?;

		let status = match document.get("status").and_then(Value::as_str) {
			Some(raw) => raw.parse().map_err(|message| DocumentError::InvalidField {
				field: "status".into(),
				message,
			})?,
			None => OrderStatus::Initiated,
		};

		Ok(Self {
			order_id,
			customer_id,
			items,
			total_amount,
			status,
			timestamp: timestamp_field(document, "timestamp").unwrap_or_else(Utc::now),
			validation_status: document
				.get("validation_status")
				.and_then(|v| serde_json::from_value(v.clone()).ok()),
			validated_at: timestamp_field(document, "validated_at"),
			storage_status: None,
			stored_at: None,
			updated_at: None,
			ttl: None,
		})
	}
}

/// A single product line in an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
	/// Identifier of the ordered product.
	pub product_id: String,
	/// Ordered quantity; strictly positive.
	pub quantity: Decimal,
	/// Unit price; non-negative.
	pub price: Decimal,
}

impl LineItem {
	/// Builds a line item from the element at `index` of a document's `items`.
	fn from_document(index: usize, item: &Value) -> Result<Self, DocumentError> {
		let field = |name: &str| format!("items[{}].{}", index, name);

		let product_id = match item.get("product_id") {
			Some(Value::String(s)) => s.clone(),
			Some(Value::Number(n)) => n.to_string(),
			Some(other) if !other.is_null() => {
				return Err(DocumentError::InvalidField {
					field: field("product_id"),
					message: "expected a string".into(),
				})
			},
			_ => return Err(DocumentError::MissingField(field("product_id"))),
		};

		Ok(Self {
			product_id,
			quantity: decimal_field(item, "quantity", &field("quantity"))?,
			price: decimal_field(item, "price", &field("price"))?,
		})
	}

	/// Line subtotal (`price * quantity`).
	pub fn subtotal(&self) -> Decimal {
		self.price * self.quantity
	}
}

/// Parses a JSON number or numeric string into an exact decimal.
///
/// Floating-point is never involved: numbers are parsed from their textual
/// representation, so `19.99` stays `19.99`. Scientific notation is accepted.
pub fn parse_decimal(value: &Value) -> Option<Decimal> {
	let text = match value {
		Value::Number(n) => n.to_string(),
		Value::String(s) => s.trim().to_string(),
		_ => return None,
	};

	Decimal::from_str(&text)
		.or_else(|_| Decimal::from_scientific(&text))
		.ok()
}

fn string_field(document: &Value, name: &str) -> Result<String, DocumentError> {
	match document.get(name) {
		Some(Value::String(s)) => Ok(s.clone()),
		Some(Value::Null) | None => Err(DocumentError::MissingField(name.into())),
		Some(_) => Err(DocumentError::InvalidField {
			field: name.into(),
			message: "expected a string".into(),
		}),
	}
}

fn decimal_field(document: &Value, name: &str, label: &str) -> Result<Decimal, DocumentError> {
	let value = document
		.get(name)
		.filter(|v| !v.is_null())
		.ok_or_else(|| DocumentError::MissingField(label.into()))?;

	parse_decimal(value).ok_or_else(|| DocumentError::InvalidField {
		field: label.into(),
		message: "expected a number".into(),
	})
}

fn timestamp_field(document: &Value, name: &str) -> Option<DateTime<Utc>> {
	document
		.get(name)
		.and_then(Value::as_str)
		.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
		.map(|dt| dt.with_timezone(&Utc))
}

/// Status of an order in the fulfillment pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
	/// Order has been accepted but not yet validated.
	Initiated,
	/// Order failed structural validation.
	ValidationFailed,
	/// Order is stored and waiting for a fulfillment attempt.
	PendingFulfillment,
	/// Order has been fulfilled.
	Fulfilled,
	/// The latest fulfillment attempt failed; a retry may follow.
	Failed,
	/// Order exhausted its retry budget and was quarantined.
	DeadLettered,
}

impl OrderStatus {
	/// Returns the wire representation of the status.
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Initiated => "INITIATED",
			OrderStatus::ValidationFailed => "VALIDATION_FAILED",
			OrderStatus::PendingFulfillment => "PENDING_FULFILLMENT",
			OrderStatus::Fulfilled => "FULFILLED",
			OrderStatus::Failed => "FAILED",
			OrderStatus::DeadLettered => "DEAD_LETTERED",
		}
	}

	/// Returns true for statuses from which no further transition is defined.
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			OrderStatus::ValidationFailed | OrderStatus::Fulfilled | OrderStatus::DeadLettered
		)
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for OrderStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"INITIATED" => Ok(Self::Initiated),
			"VALIDATION_FAILED" => Ok(Self::ValidationFailed),
			"PENDING_FULFILLMENT" => Ok(Self::PendingFulfillment),
			"FULFILLED" => Ok(Self::Fulfilled),
			"FAILED" => Ok(Self::Failed),
			"DEAD_LETTERED" => Ok(Self::DeadLettered),
			other => Err(format!("unknown order status '{}'", other)),
		}
	}
}

/// Outcome recorded by the validation stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
	Passed,
	Failed,
}

/// Outcome recorded by the storage stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageStatus {
	Stored,
}

/// Decision made by the retry policy after a failed fulfillment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
	/// Signal failure so the transport redelivers the message later.
	Retry,
	/// Move the order to the dead-letter store and acknowledge the message.
	Quarantine,
}

/// Reason recorded on every quarantine record.
pub const QUARANTINE_REASON: &str = "Fulfillment failed after max retries";

/// Dead-letter record for an order that exhausted its retry budget.
///
/// Holds an immutable snapshot of the order as it was at quarantine time,
/// together with the delivery context needed for manual recovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuarantinedOrder {
	/// Identifier of the quarantined order.
	pub order_id: String,
	/// Snapshot of the order at quarantine time.
	pub original_order: Order,
	/// Always [`OrderStatus::DeadLettered`].
	pub status: OrderStatus,
	/// Human-readable reason for the quarantine.
	pub failure_reason: String,
	/// Time the record was created.
	pub failed_at: DateTime<Utc>,
	/// Transport identifier of the delivery that exhausted the budget.
	pub delivery_message_id: String,
	/// Receive count reported by the transport for that delivery.
	pub receive_count: u32,
	/// Retry budget in force when the order was quarantined.
	pub max_receive_count: u32,
	/// Unix-seconds expiry marker (one year after `failed_at`).
	pub ttl: i64,
}

/// Order that was rejected by the validation stage.
///
/// The untyped document is kept as received so malformed orders remain
/// inspectable instead of being dropped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RejectedOrder {
	pub order_id: String,
	/// Always [`OrderStatus::ValidationFailed`].
	pub status: OrderStatus,
	pub validation_status: ValidationStatus,
	pub validation_errors: Vec<String>,
	pub timestamp: DateTime<Utc>,
	/// The boundary document that failed validation.
	pub document: Value,
}

/// State of one orchestration run (validate then store).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
	Running,
	Succeeded,
	Failed,
}

/// Bookkeeping record for one ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRecord {
	/// Reference returned to the API caller.
	pub execution_reference: String,
	pub order_id: String,
	pub state: ExecutionState,
	pub started_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub finished_at: Option<DateTime<Utc>>,
	/// Validation defects or a generic fault description when `state` is `FAILED`.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub errors: Vec<String>,
}

impl ExecutionRecord {
	/// Creates a running record; the reference embeds the order and start time.
	pub fn start(order_id: &str, started_at: DateTime<Utc>) -> Self {
		Self {
			execution_reference: format!("order-{}-{}", order_id, started_at.timestamp()),
			order_id: order_id.to_string(),
			state: ExecutionState::Running,
			started_at,
			finished_at: None,
			errors: Vec::new(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn dec(s: &str) -> Decimal {
		s.parse().unwrap()
	}

	fn document() -> Value {
		json!({
			"order_id": "ord-1",
			"customer_id": "cust-1",
			"items": [
				{"product_id": "p1", "quantity": 2, "price": 19.99},
				{"product_id": 42, "quantity": "1", "price": "5.01"}
			],
			"total_amount": 45.0,
			"timestamp": "2024-03-01T10:00:00Z",
			"status": "INITIATED",
			"validation_status": "PASSED"
		})
	}

	#[test]
	fn test_from_document_parses_exact_decimals() {
		let order = Order::from_document(&document()).unwrap();

		assert_eq!(order.order_id, "ord-1");
		assert_eq!(order.items.len(), 2);
		assert_eq!(order.items[0].price, dec("19.99"));
		assert_eq!(order.items[1].product_id, "42");
		assert_eq!(order.items[1].quantity, dec("1"));
		assert_eq!(order.total_amount, dec("45.0"));
		assert_eq!(order.status, OrderStatus::Initiated);
		assert_eq!(order.validation_status, Some(ValidationStatus::Passed));
		assert_eq!(order.timestamp.to_rfc3339(), "2024-03-01T10:00:00+00:00");
	}

	#[test]
	fn test_from_document_reports_bad_fields() {
		let mut doc = document();
		doc["items"][1]["price"] = json!("abc");
		assert_eq!(
			Order::from_document(&doc),
			Err(DocumentError::InvalidField {
				field: "items[1].price".into(),
				message: "expected a number".into(),
			})
		);

		let mut doc = document();
		doc.as_object_mut().unwrap().remove("customer_id");
		assert_eq!(
			Order::from_document(&doc),
			Err(DocumentError::MissingField("customer_id".into()))
		);
	}

	#[test]
	fn test_parse_decimal() {
		assert_eq!(parse_decimal(&json!(0.1)), Some(dec("0.1")));
		assert_eq!(parse_decimal(&json!(" 3.50 ")), Some(dec("3.50")));
		assert_eq!(parse_decimal(&json!("1e3")), Some(dec("1000")));
		assert_eq!(parse_decimal(&json!(-2)), Some(dec("-2")));
		assert_eq!(parse_decimal(&json!("ten")), None);
		assert_eq!(parse_decimal(&json!(true)), None);
		assert_eq!(parse_decimal(&json!(null)), None);
	}

	#[test]
	fn test_status_wire_format() {
		let encoded = serde_json::to_value(OrderStatus::PendingFulfillment).unwrap();
		assert_eq!(encoded, json!("PENDING_FULFILLMENT"));
		assert_eq!(
			"DEAD_LETTERED".parse::<OrderStatus>(),
			Ok(OrderStatus::DeadLettered)
		);
		assert!("SHIPPED".parse::<OrderStatus>().is_err());
		assert_eq!(OrderStatus::Failed.to_string(), "FAILED");
	}

	#[test]
	fn test_terminal_statuses() {
		assert!(OrderStatus::Fulfilled.is_terminal());
		assert!(OrderStatus::DeadLettered.is_terminal());
		assert!(OrderStatus::ValidationFailed.is_terminal());
		assert!(!OrderStatus::Failed.is_terminal());
		assert!(!OrderStatus::PendingFulfillment.is_terminal());
	}

	#[test]
	fn test_decimal_amounts_serialize_as_strings() {
		let order = Order::from_document(&document()).unwrap();
		let encoded = serde_json::to_value(&order).unwrap();
		assert_eq!(encoded["items"][0]["price"], json!("19.99"));
		assert_eq!(encoded["total_amount"], json!("45.0"));
		assert!(encoded.get("stored_at").is_none());
	}

	#[test]
	fn test_execution_reference() {
		let started = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
			.unwrap()
			.with_timezone(&Utc);
		let record = ExecutionRecord::start("abc", started);
		assert_eq!(record.execution_reference, "order-abc-1709287200");
		assert_eq!(record.state, ExecutionState::Running);
	}
}
