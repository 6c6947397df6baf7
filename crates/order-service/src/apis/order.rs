//! Order API implementation.
//!
//! Accepts order submissions and exposes read access to stored orders,
//! quarantine records and ingestion execution records. Internal failures are
//! logged with their details and reported to clients as a generic 500.

use axum::body::Bytes;
use order_core::{IngestError, OrderEngine, OrderStoreError};
use order_types::{
	truncate_id, APIError, ExecutionRecord, Order, QuarantinedOrder, SubmitOrderResponse,
	ORDER_ACCEPTED_MESSAGE,
};
use serde_json::Value;
use tracing::{info, warn};

/// Handles POST /orders submissions.
///
/// The body is parsed here rather than by an extractor so that empty and
/// malformed bodies get the exact error texts of the API contract.
pub async fn submit_order(
	body: Bytes,
	engine: &OrderEngine,
) -> Result<SubmitOrderResponse, APIError> {
	if body.iter().all(u8::is_ascii_whitespace) {
		return Err(APIError::BadRequest {
			message: IngestError::EmptyBody.to_string(),
		});
	}

	let payload: Value = serde_json::from_slice(&body).map_err(|e| {
		warn!("Invalid JSON in request body: {}", e);
		APIError::BadRequest {
			message: "Invalid JSON in request body".to_string(),
		}
	})?;

	match engine.submit(&payload).await {
		Ok(receipt) => {
			info!(
				order_id = %truncate_id(&receipt.order_id),
				execution_reference = %receipt.execution_reference,
				"Order accepted"
			);
			Ok(SubmitOrderResponse {
				message: ORDER_ACCEPTED_MESSAGE.to_string(),
				order_id: receipt.order_id,
				execution_reference: receipt.execution_reference,
			})
		},
		Err(IngestError::EmptyBody) => Err(APIError::BadRequest {
			message: IngestError::EmptyBody.to_string(),
		}),
		Err(e) => {
			tracing::error!(event_type = "api_handler_error", error = %e, "Order submission failed");
			Err(APIError::internal())
		},
	}
}

/// Handles GET /orders/{id} requests.
pub async fn get_order_by_id(id: &str, engine: &OrderEngine) -> Result<Order, APIError> {
	engine
		.order_store()
		.get_order(id)
		.await
		.map_err(|e| lookup_error(e, "Order", id))
}

/// Handles GET /orders/{id}/quarantine requests.
pub async fn get_quarantine_record(
	id: &str,
	engine: &OrderEngine,
) -> Result<QuarantinedOrder, APIError> {
	engine
		.order_store()
		.get_quarantined(id)
		.await
		.map_err(|e| lookup_error(e, "Quarantine record", id))
}

/// Handles GET /executions/{reference} requests.
pub async fn get_execution(
	reference: &str,
	engine: &OrderEngine,
) -> Result<ExecutionRecord, APIError> {
	engine
		.order_store()
		.get_execution(reference)
		.await
		.map_err(|e| lookup_error(e, "Execution", reference))
}

fn lookup_error(err: OrderStoreError, kind: &str, id: &str) -> APIError {
	match err {
		OrderStoreError::NotFound(_) => APIError::NotFound {
			message: format!("{} not found: {}", kind, id),
		},
		other => {
			tracing::error!(id = %id, error = %other, "{} lookup failed", kind);
			APIError::internal()
		},
	}
}
