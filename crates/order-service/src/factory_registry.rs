//! Factory registry for pipeline implementations.
//!
//! Collects the factory functions of every storage, queue and fulfillment
//! implementation so the engine can be assembled from configuration alone.

use order_config::Config;
use order_core::{OrderEngine, OrderEngineBuilder, OrderFactories};
use order_fulfillment::FulfillmentFactory;
use order_queue::QueueFactory;
use order_storage::StorageFactory;
use std::collections::HashMap;

/// Registry of all implementation factories, keyed by implementation name.
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
	pub queue: HashMap<String, QueueFactory>,
	pub fulfillment: HashMap<String, FulfillmentFactory>,
}

impl FactoryRegistry {
	/// Create a new empty registry
	pub fn new() -> Self {
		Self {
			storage: HashMap::new(),
			queue: HashMap::new(),
			fulfillment: HashMap::new(),
		}
	}

	/// Creates a registry holding every implementation shipped with the service.
	pub fn with_all_implementations() -> Self {
		let mut registry = Self::new();

		for (name, factory) in order_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.register_storage(name, factory);
		}

		for (name, factory) in order_queue::get_all_implementations() {
			tracing::debug!("Registering queue implementation: {}", name);
			registry.register_queue(name, factory);
		}

		for (name, factory) in order_fulfillment::get_all_implementations() {
			tracing::debug!("Registering fulfillment implementation: {}", name);
			registry.register_fulfillment(name, factory);
		}

		registry
	}

	/// Register a storage implementation
	pub fn register_storage(&mut self, name: impl Into<String>, factory: StorageFactory) {
		self.storage.insert(name.into(), factory);
	}

	/// Register a queue implementation
	pub fn register_queue(&mut self, name: impl Into<String>, factory: QueueFactory) {
		self.queue.insert(name.into(), factory);
	}

	/// Register a fulfillment implementation
	pub fn register_fulfillment(&mut self, name: impl Into<String>, factory: FulfillmentFactory) {
		self.fulfillment.insert(name.into(), factory);
	}
}

impl Default for FactoryRegistry {
	fn default() -> Self {
		Self::new()
	}
}

/// Macro to build factories from config implementations
macro_rules! build_factories {
	($registry:expr, $config_impls:expr, $registry_field:ident, $type_name:literal) => {{
		let mut factories = HashMap::new();
		for name in $config_impls.keys() {
			if let Some(factory) = $registry.$registry_field.get(name) {
				factories.insert(name.clone(), *factory);
			} else {
				let mut available: Vec<_> = $registry.$registry_field.keys().cloned().collect();
				available.sort();
				return Err(format!(
					"Unknown {} implementation '{}'. Available: [{}]",
					$type_name,
					name,
					available.join(", ")
				)
				.into());
			}
		}
		factories
	}};
}

/// Build the engine using the registry and config
pub async fn build_engine_from_config(
	registry: &FactoryRegistry,
	config: Config,
) -> Result<OrderEngine, Box<dyn std::error::Error>> {
	let storage_factories =
		build_factories!(registry, config.storage.implementations, storage, "storage");
	let queue_factories = build_factories!(registry, config.queue.implementations, queue, "queue");
	let fulfillment_factories = build_factories!(
		registry,
		config.fulfillment.implementations,
		fulfillment,
		"fulfillment"
	);

	let factories = OrderFactories {
		storage_factories,
		queue_factories,
		fulfillment_factories,
	};

	Ok(OrderEngineBuilder::new(config).build(factories).await?)
}
