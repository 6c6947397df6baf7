//! Core orchestration for the order pipeline.
//!
//! Ties the pluggable storage, queue and fulfillment services together:
//! the validator and ingest handler admit new orders, the order store
//! enforces the lifecycle, and the engine runs the fulfillment worker loop.

pub mod builder;
pub mod engine;
pub mod handlers;
pub mod state;
pub mod validator;

pub use builder::{BuilderError, OrderEngineBuilder, OrderFactories};
pub use engine::event_bus::EventBus;
pub use engine::{EngineError, IngestReceipt, OrderEngine};
pub use handlers::{IngestError, IngestOutcome};
pub use state::{OrderStore, OrderStoreError};

#[cfg(test)]
pub(crate) mod test_support {
	use crate::builder::OrderFactories;
	use chrono::Utc;
	use order_config::{Config, ConfigBuilder};
	use order_fulfillment::FulfillmentFactory;
	use order_queue::QueueFactory;
	use order_storage::StorageFactory;
	use order_types::{LineItem, Order, OrderStatus};
	use rust_decimal::Decimal;
	use serde_json::{json, Value};
	use std::collections::HashMap;

	pub fn config() -> Config {
		ConfigBuilder::new().build()
	}

	pub fn factories() -> OrderFactories<StorageFactory, QueueFactory, FulfillmentFactory> {
		OrderFactories {
			storage_factories: order_storage::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect::<HashMap<_, _>>(),
			queue_factories: order_queue::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			fulfillment_factories: order_fulfillment::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		}
	}

	/// Scripted fulfillment table returning `outcomes` in order, then success.
	pub fn scripted(outcomes: &[&str]) -> toml::Value {
		let mut table = toml::map::Map::new();
		table.insert(
			"outcomes".into(),
			toml::Value::Array(
				outcomes
					.iter()
					.map(|o| toml::Value::String(o.to_string()))
					.collect(),
			),
		);
		toml::Value::Table(table)
	}

	pub fn order_body() -> Value {
		json!({
			"customer_id": "cust-1",
			"items": [
				{"product_id": "p-1", "quantity": 2, "price": "19.99"},
				{"product_id": "p-2", "quantity": 1, "price": 9.99}
			],
			"total_amount": "49.97"
		})
	}

	pub fn pending_order(order_id: &str) -> Order {
		Order {
			order_id: order_id.into(),
			customer_id: "cust-1".into(),
			items: vec![LineItem {
				product_id: "p-1".into(),
				quantity: Decimal::new(2, 0),
				price: Decimal::new(1999, 2),
			}],
			total_amount: Decimal::new(3998, 2),
			status: OrderStatus::PendingFulfillment,
			timestamp: Utc::now(),
			validation_status: None,
			validated_at: None,
			storage_status: None,
			stored_at: None,
			updated_at: None,
			ttl: None,
		}
	}
}
