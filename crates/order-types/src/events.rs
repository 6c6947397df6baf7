//! Event types for inter-component communication.
//!
//! Events are published on the engine's event bus as orders move through
//! the pipeline, so observers (logging, tests, the API) can follow the
//! lifecycle without polling the store.

use crate::OrderStatus;
use serde::{Deserialize, Serialize};

/// Main event type encompassing all pipeline events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
	/// Events from the ingestion path.
	Ingest(IngestEvent),
	/// Events from the fulfillment path.
	Fulfillment(FulfillmentEvent),
}

/// Events related to order ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IngestEvent {
	/// An order request has been accepted and an execution started.
	Received {
		order_id: String,
		execution_reference: String,
	},
	/// The order was rejected by validation.
	Rejected {
		order_id: String,
		errors: Vec<String>,
	},
	/// The order was stored and enqueued for fulfillment.
	Stored { order_id: String },
	/// The ingestion run failed on an infrastructure fault.
	Failed { order_id: String, error: String },
}

/// Events related to fulfillment deliveries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FulfillmentEvent {
	/// The order was fulfilled.
	Fulfilled { order_id: String },
	/// A fulfillment attempt failed and redelivery was requested.
	AttemptFailed {
		order_id: String,
		receive_count: u32,
	},
	/// The order exhausted its retry budget and was quarantined.
	Quarantined {
		order_id: String,
		receive_count: u32,
	},
	/// A redelivery arrived for an order that needs no further work.
	DuplicateDelivery {
		order_id: String,
		status: OrderStatus,
	},
	/// Processing a delivery hit a fault; the transport will redeliver.
	Fault {
		order_id: Option<String>,
		reason: String,
	},
}
