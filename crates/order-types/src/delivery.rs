//! Queue delivery types for the fulfillment stage.
//!
//! The fulfillment queue is at-least-once: a message that is not
//! acknowledged becomes visible again after its visibility timeout, and every
//! receive increments its receive count. These types carry one received
//! message to the fulfillment handler and the handler's verdict back to the
//! worker loop.

use crate::OrderStatus;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A message received from the fulfillment queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
	/// Transport-assigned identifier, stable across redeliveries.
	pub message_id: String,
	/// Handle used to acknowledge this particular receive.
	pub receipt_handle: String,
	/// Serialized order snapshot.
	pub body: String,
	/// Number of times the transport has handed out this message, including this one.
	pub receive_count: u32,
	/// Time the message was first enqueued.
	pub enqueued_at: DateTime<Utc>,
}

impl Delivery {
	/// Decodes the message body into the given type.
	pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
		serde_json::from_str(&self.body)
	}
}

/// Why a delivery was acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckReason {
	/// The fulfillment attempt succeeded.
	Fulfilled,
	/// The retry budget was exhausted and the order was quarantined.
	Quarantined,
	/// The order had already reached this terminal status.
	AlreadyTerminal(OrderStatus),
	/// A quarantine record already existed for the order.
	AlreadyQuarantined,
}

/// Outcome of handling one delivery.
///
/// The worker loop acknowledges the message only for [`DeliveryDisposition::Acked`];
/// both other variants leave the message in flight so the transport redelivers it.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryDisposition {
	/// Processing finished; the message must not be delivered again.
	Acked { order_id: String, reason: AckReason },
	/// Fulfillment failed within the retry budget; redeliver later.
	RequestRedelivery { order_id: String, receive_count: u32 },
	/// A store, simulator or decoding fault interrupted processing.
	Fatal {
		order_id: Option<String>,
		reason: String,
	},
}

impl DeliveryDisposition {
	/// Returns true when the message should be acknowledged.
	pub fn should_ack(&self) -> bool {
		matches!(self, DeliveryDisposition::Acked { .. })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::Order;
	use serde_json::json;

	#[test]
	fn test_decode_order_body() {
		let body = json!({
			"order_id": "o-1",
			"customer_id": "c-1",
			"items": [{"product_id": "p", "quantity": "1", "price": "2.50"}],
			"total_amount": "2.50",
			"status": "PENDING_FULFILLMENT",
			"timestamp": "2024-01-01T00:00:00Z"
		});
		let delivery = Delivery {
			message_id: "m-1".into(),
			receipt_handle: "r-1".into(),
			body: body.to_string(),
			receive_count: 1,
			enqueued_at: Utc::now(),
		};

		let order: Order = delivery.decode().unwrap();
		assert_eq!(order.order_id, "o-1");
		assert_eq!(order.status, OrderStatus::PendingFulfillment);
	}

	#[test]
	fn test_only_acked_is_acknowledged() {
		let acked = DeliveryDisposition::Acked {
			order_id: "o".into(),
			reason: AckReason::Fulfilled,
		};
		let retry = DeliveryDisposition::RequestRedelivery {
			order_id: "o".into(),
			receive_count: 1,
		};
		let fatal = DeliveryDisposition::Fatal {
			order_id: None,
			reason: "boom".into(),
		};
		assert!(acked.should_ack());
		assert!(!retry.should_ack());
		assert!(!fatal.should_ack());
	}
}
