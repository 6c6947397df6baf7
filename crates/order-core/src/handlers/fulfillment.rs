//! Fulfillment handler for queued orders.
//!
//! Handles one delivery from the fulfillment queue: runs a fulfillment
//! attempt, records the outcome on the stored order and, once the retry
//! budget is exhausted, writes the quarantine record. The returned
//! [`DeliveryDisposition`] tells the worker loop whether to acknowledge the
//! message.

use crate::engine::event_bus::EventBus;
use crate::state::{OrderStore, OrderStoreError};
use order_fulfillment::FulfillmentService;
use order_types::{
	current_timestamp, expiry_timestamp, truncate_id, AckReason, Delivery, DeliveryDisposition,
	FulfillmentEvent, Order, OrderStatus, PipelineEvent, QuarantinedOrder, RetryDecision,
	QUARANTINE_REASON,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors that interrupt the handling of a delivery.
#[derive(Debug, Error)]
pub enum FulfillmentHandlerError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Service error: {0}")]
	Service(String),
}

impl From<OrderStoreError> for FulfillmentHandlerError {
	fn from(err: OrderStoreError) -> Self {
		FulfillmentHandlerError::Storage(err.to_string())
	}
}

/// Handler for fulfillment deliveries.
pub struct FulfillmentHandler {
	order_store: Arc<OrderStore>,
	fulfillment: Arc<FulfillmentService>,
	event_bus: EventBus,
}

impl FulfillmentHandler {
	pub fn new(
		order_store: Arc<OrderStore>,
		fulfillment: Arc<FulfillmentService>,
		event_bus: EventBus,
	) -> Self {
		Self {
			order_store,
			fulfillment,
			event_bus,
		}
	}

	/// Handles one delivery and reports what should happen to the message.
	///
	/// Never fails: faults are reported as [`DeliveryDisposition::Fatal`] so
	/// the transport redelivers the message.
	#[instrument(skip_all, fields(message_id = %delivery.message_id, receive_count = delivery.receive_count))]
	pub async fn handle(&self, delivery: &Delivery) -> DeliveryDisposition {
		let snapshot: Order = match delivery.decode() {
			Ok(order) => order,
			Err(e) => return self.fatal(None, format!("Undecodable order message: {}", e)),
		};

		let order_id = snapshot.order_id.clone();
		match self.process(delivery, snapshot).await {
			Ok(disposition) => disposition,
			Err(e) => self.fatal(Some(order_id), e.to_string()),
		}
	}

	async fn process(
		&self,
		delivery: &Delivery,
		snapshot: Order,
	) -> Result<DeliveryDisposition, FulfillmentHandlerError> {
		let order_id = snapshot.order_id.clone();
		tracing::info!(
			order_id = %truncate_id(&order_id),
			event_type = "fulfillment_started",
			"Processing fulfillment delivery"
		);

		let current = match self.order_store.get_order(&order_id).await {
			Ok(order) => order,
			Err(OrderStoreError::NotFound(_)) => {
				tracing::warn!(
					order_id = %truncate_id(&order_id),
					"Order missing from store, restoring from message"
				);
				self.order_store.persist(snapshot).await?
			},
			Err(e) => return Err(e.into()),
		};

		if current.status.is_terminal() {
			return Ok(self.duplicate(order_id, current.status));
		}
		if self.order_store.is_quarantined(&order_id).await? {
			tracing::info!(
				order_id = %truncate_id(&order_id),
				"Order already quarantined, acknowledging delivery"
			);
			self.publish(FulfillmentEvent::DuplicateDelivery {
				order_id: order_id.clone(),
				status: current.status,
			});
			return Ok(DeliveryDisposition::Acked {
				order_id,
				reason: AckReason::AlreadyQuarantined,
			});
		}

		let fulfilled = self
			.fulfillment
			.attempt(&current)
			.await
			.map_err(|e| FulfillmentHandlerError::Service(e.to_string()))?;

		if fulfilled {
			return match self
				.order_store
				.update_status(&order_id, OrderStatus::Fulfilled)
				.await
			{
				Ok(_) => {
					tracing::info!(
						order_id = %truncate_id(&order_id),
						event_type = "fulfillment_successful",
						"Order fulfilled"
					);
					self.publish(FulfillmentEvent::Fulfilled {
						order_id: order_id.clone(),
					});
					Ok(DeliveryDisposition::Acked {
						order_id,
						reason: AckReason::Fulfilled,
					})
				},
				Err(OrderStoreError::InvalidTransition { from, .. }) if from.is_terminal() => {
					Ok(self.duplicate(order_id, from))
				},
				Err(e) => Err(e.into()),
			};
		}

		let failed = match self
			.order_store
			.update_status(&order_id, OrderStatus::Failed)
			.await
		{
			Ok(order) => order,
			Err(OrderStoreError::InvalidTransition { from, .. }) if from.is_terminal() => {
				return Ok(self.duplicate(order_id, from));
			},
			Err(e) => return Err(e.into()),
		};

		let policy = self.fulfillment.policy();
		match policy.decide(delivery.receive_count) {
			RetryDecision::Retry => {
				tracing::warn!(
					order_id = %truncate_id(&order_id),
					event_type = "fulfillment_failed_retrying",
					receive_count = delivery.receive_count,
					"Fulfillment failed, requesting redelivery"
				);
				self.publish(FulfillmentEvent::AttemptFailed {
					order_id: order_id.clone(),
					receive_count: delivery.receive_count,
				});
				Ok(DeliveryDisposition::RequestRedelivery {
					order_id,
					receive_count: delivery.receive_count,
				})
			},
			RetryDecision::Quarantine => {
				let failed_at = current_timestamp();
				let record = QuarantinedOrder {
					order_id: order_id.clone(),
					original_order: failed,
					status: OrderStatus::DeadLettered,
					failure_reason: QUARANTINE_REASON.to_string(),
					failed_at,
					delivery_message_id: delivery.message_id.clone(),
					receive_count: delivery.receive_count,
					max_receive_count: policy.max_receive_count(),
					ttl: expiry_timestamp(failed_at, self.order_store.quarantine_ttl()),
				};

				if !self.order_store.quarantine(&record).await? {
					tracing::info!(
						order_id = %truncate_id(&order_id),
						"Quarantine record already present"
					);
					return Ok(DeliveryDisposition::Acked {
						order_id,
						reason: AckReason::AlreadyQuarantined,
					});
				}

				tracing::error!(
					order_id = %truncate_id(&order_id),
					event_type = "order_moved_to_dlq",
					receive_count = delivery.receive_count,
					max_receive_count = policy.max_receive_count(),
					"Order quarantined after max retries"
				);
				self.publish(FulfillmentEvent::Quarantined {
					order_id: order_id.clone(),
					receive_count: delivery.receive_count,
				});
				Ok(DeliveryDisposition::Acked {
					order_id,
					reason: AckReason::Quarantined,
				})
			},
		}
	}

	fn duplicate(&self, order_id: String, status: OrderStatus) -> DeliveryDisposition {
		tracing::info!(
			order_id = %truncate_id(&order_id),
			status = %status,
			"Order already terminal, acknowledging duplicate delivery"
		);
		self.publish(FulfillmentEvent::DuplicateDelivery {
			order_id: order_id.clone(),
			status,
		});
		DeliveryDisposition::Acked {
			order_id,
			reason: AckReason::AlreadyTerminal(status),
		}
	}

	fn fatal(&self, order_id: Option<String>, reason: String) -> DeliveryDisposition {
		tracing::error!(
			order_id = %order_id.as_deref().map(truncate_id).unwrap_or_default(),
			event_type = "process_order_error",
			error = %reason,
			"Fulfillment delivery failed"
		);
		self.publish(FulfillmentEvent::Fault {
			order_id: order_id.clone(),
			reason: reason.clone(),
		});
		DeliveryDisposition::Fatal { order_id, reason }
	}

	fn publish(&self, event: FulfillmentEvent) {
		self.event_bus
			.publish(PipelineEvent::Fulfillment(event))
			.ok();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{config, pending_order};
	use async_trait::async_trait;
	use chrono::Utc;
	use mockall::mock;
	use order_fulfillment::implementations::scripted::{ScriptedFulfillment, ScriptedOutcome};
	use order_fulfillment::RetryPolicy;
	use order_storage::implementations::memory::MemoryStorage;
	use order_storage::{StorageError, StorageInterface, StorageService};
	use order_types::ConfigSchema;
	use std::time::Duration;

	mock! {
		Backend {}

		#[async_trait]
		impl StorageInterface for Backend {
			async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;
			async fn set_bytes(
				&self,
				key: &str,
				value: Vec<u8>,
				ttl: Option<Duration>,
			) -> Result<(), StorageError>;
			async fn set_bytes_if_absent(
				&self,
				key: &str,
				value: Vec<u8>,
				ttl: Option<Duration>,
			) -> Result<bool, StorageError>;
			async fn update_fields(
				&self,
				key: &str,
				fields: serde_json::Map<String, serde_json::Value>,
			) -> Result<Vec<u8>, StorageError>;
			async fn delete(&self, key: &str) -> Result<(), StorageError>;
			async fn exists(&self, key: &str) -> Result<bool, StorageError>;
			fn config_schema(&self) -> Box<dyn ConfigSchema>;
			async fn cleanup_expired(&self) -> Result<usize, StorageError>;
		}
	}

	fn handler_with(
		backend: Box<dyn StorageInterface>,
		outcomes: Vec<ScriptedOutcome>,
	) -> (FulfillmentHandler, Arc<OrderStore>) {
		let storage = Arc::new(StorageService::new(backend));
		let store = Arc::new(OrderStore::new(storage, &config().storage));
		let fulfillment = Arc::new(FulfillmentService::new(
			Box::new(ScriptedFulfillment::new(outcomes, ScriptedOutcome::Succeed)),
			RetryPolicy::new(3),
		));
		let handler = FulfillmentHandler::new(store.clone(), fulfillment, EventBus::new(16));
		(handler, store)
	}

	fn handler(outcomes: Vec<ScriptedOutcome>) -> (FulfillmentHandler, Arc<OrderStore>) {
		handler_with(Box::new(MemoryStorage::new()), outcomes)
	}

	fn delivery(order: &Order, receive_count: u32) -> Delivery {
		Delivery {
			message_id: "msg-1".into(),
			receipt_handle: format!("1:{}", receive_count),
			body: serde_json::to_string(order).unwrap(),
			receive_count,
			enqueued_at: Utc::now(),
		}
	}

	#[tokio::test]
	async fn test_success_marks_fulfilled() {
		let (handler, store) = handler(vec![ScriptedOutcome::Succeed]);
		let order = store.persist(pending_order("ord-1")).await.unwrap();

		let disposition = handler.handle(&delivery(&order, 1)).await;

		assert_eq!(
			disposition,
			DeliveryDisposition::Acked {
				order_id: "ord-1".into(),
				reason: AckReason::Fulfilled
			}
		);
		assert_eq!(
			store.get_order("ord-1").await.unwrap().status,
			OrderStatus::Fulfilled
		);
	}

	#[tokio::test]
	async fn test_failure_within_budget_requests_redelivery() {
		let (handler, store) = handler(vec![ScriptedOutcome::Fail]);
		let order = store.persist(pending_order("ord-1")).await.unwrap();

		let disposition = handler.handle(&delivery(&order, 1)).await;

		assert_eq!(
			disposition,
			DeliveryDisposition::RequestRedelivery {
				order_id: "ord-1".into(),
				receive_count: 1
			}
		);
		assert!(!disposition.should_ack());
		assert_eq!(
			store.get_order("ord-1").await.unwrap().status,
			OrderStatus::Failed
		);
		assert!(!store.is_quarantined("ord-1").await.unwrap());
	}

	#[tokio::test]
	async fn test_failure_at_budget_quarantines() {
		let (handler, store) = handler(vec![ScriptedOutcome::Fail]);
		let order = store.persist(pending_order("ord-1")).await.unwrap();

		let disposition = handler.handle(&delivery(&order, 3)).await;

		assert_eq!(
			disposition,
			DeliveryDisposition::Acked {
				order_id: "ord-1".into(),
				reason: AckReason::Quarantined
			}
		);
		let live = store.get_order("ord-1").await.unwrap();
		assert_eq!(live.status, OrderStatus::Failed);

		let record = store.get_quarantined("ord-1").await.unwrap();
		assert_eq!(record.status, OrderStatus::DeadLettered);
		assert_eq!(record.failure_reason, QUARANTINE_REASON);
		assert_eq!(record.receive_count, 3);
		assert_eq!(record.max_receive_count, 3);
		assert_eq!(record.delivery_message_id, "msg-1");
		assert_eq!(record.original_order, live);
		let expected_ttl = record.failed_at.timestamp() + 365 * 24 * 60 * 60;
		assert_eq!(record.ttl, expected_ttl);
	}

	#[tokio::test]
	async fn test_duplicate_delivery_of_fulfilled_order() {
		let (handler, store) = handler(vec![ScriptedOutcome::Fail]);
		let order = store.persist(pending_order("ord-1")).await.unwrap();
		store
			.update_status("ord-1", OrderStatus::Fulfilled)
			.await
			.unwrap();

		let disposition = handler.handle(&delivery(&order, 2)).await;

		assert_eq!(
			disposition,
			DeliveryDisposition::Acked {
				order_id: "ord-1".into(),
				reason: AckReason::AlreadyTerminal(OrderStatus::Fulfilled)
			}
		);
		assert_eq!(
			store.get_order("ord-1").await.unwrap().status,
			OrderStatus::Fulfilled
		);
	}

	#[tokio::test]
	async fn test_redelivery_after_quarantine_is_acked() {
		let (handler, store) = handler(vec![ScriptedOutcome::Fail, ScriptedOutcome::Fail]);
		let order = store.persist(pending_order("ord-1")).await.unwrap();

		handler.handle(&delivery(&order, 3)).await;
		let record = store.get_quarantined("ord-1").await.unwrap();

		let disposition = handler.handle(&delivery(&order, 4)).await;
		assert_eq!(
			disposition,
			DeliveryDisposition::Acked {
				order_id: "ord-1".into(),
				reason: AckReason::AlreadyQuarantined
			}
		);
		assert_eq!(store.get_quarantined("ord-1").await.unwrap(), record);
	}

	#[tokio::test]
	async fn test_missing_order_is_restored_from_message() {
		let (handler, store) = handler(vec![ScriptedOutcome::Succeed]);
		let order = pending_order("ord-9");

		let disposition = handler.handle(&delivery(&order, 1)).await;

		assert!(disposition.should_ack());
		let stored = store.get_order("ord-9").await.unwrap();
		assert_eq!(stored.status, OrderStatus::Fulfilled);
		assert_eq!(stored.customer_id, order.customer_id);
	}

	#[tokio::test]
	async fn test_undecodable_body_is_fatal() {
		let (handler, _) = handler(vec![]);
		let mut bad = delivery(&pending_order("ord-1"), 1);
		bad.body = "{not json".into();

		let disposition = handler.handle(&bad).await;
		assert!(matches!(
			disposition,
			DeliveryDisposition::Fatal { order_id: None, .. }
		));
	}

	#[tokio::test]
	async fn test_unavailable_backend_is_fatal_without_status_change() {
		let (handler, store) = handler(vec![ScriptedOutcome::Unavailable]);
		let order = store.persist(pending_order("ord-1")).await.unwrap();

		let disposition = handler.handle(&delivery(&order, 1)).await;

		assert!(matches!(
			disposition,
			DeliveryDisposition::Fatal { order_id: Some(ref id), .. } if id == "ord-1"
		));
		assert_eq!(
			store.get_order("ord-1").await.unwrap().status,
			OrderStatus::PendingFulfillment
		);
	}

	#[tokio::test]
	async fn test_store_fault_is_fatal() {
		let mut backend = MockBackend::new();
		backend
			.expect_get_bytes()
			.returning(|_| Err(StorageError::Backend("connection reset".into())));
		let (handler, _) = handler_with(Box::new(backend), vec![ScriptedOutcome::Succeed]);

		let disposition = handler.handle(&delivery(&pending_order("ord-1"), 1)).await;

		match disposition {
			DeliveryDisposition::Fatal { order_id, reason } => {
				assert_eq!(order_id.as_deref(), Some("ord-1"));
				assert!(reason.contains("connection reset"));
			},
			other => panic!("unexpected disposition: {:?}", other),
		}
	}
}
