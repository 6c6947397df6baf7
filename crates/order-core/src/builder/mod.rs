//! Builder pattern for constructing order engines.
//!
//! Composes an OrderEngine from pluggable storage, queue and fulfillment
//! implementations using factory functions keyed by implementation name.

use crate::engine::{event_bus::EventBus, OrderEngine};
use order_config::Config;
use order_fulfillment::{
	FulfillmentError, FulfillmentInterface, FulfillmentService, RetryPolicy,
};
use order_queue::{QueueError, QueueInterface, QueueService};
use order_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;

/// Capacity of the engine's event bus.
const EVENT_BUS_CAPACITY: usize = 1000;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Container for all factory functions needed to build an OrderEngine.
///
/// Each factory takes the implementation's TOML table and returns the
/// implementation, validating the table on the way.
pub struct OrderFactories<SF, QF, FF> {
	pub storage_factories: HashMap<String, SF>,
	pub queue_factories: HashMap<String, QF>,
	pub fulfillment_factories: HashMap<String, FF>,
}

/// Builder for constructing an OrderEngine with pluggable implementations.
pub struct OrderEngineBuilder {
	config: Config,
}

impl OrderEngineBuilder {
	/// Creates a new OrderEngineBuilder with the given configuration.
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the OrderEngine using factories for each component type.
	pub async fn build<SF, QF, FF>(
		self,
		factories: OrderFactories<SF, QF, FF>,
	) -> Result<OrderEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		QF: Fn(&toml::Value) -> Result<Box<dyn QueueInterface>, QueueError>,
		FF: Fn(&toml::Value) -> Result<Box<dyn FulfillmentInterface>, FulfillmentError>,
	{
		let storage_backend = create_primary(
			"storage",
			&self.config.storage.primary,
			&self.config.storage.implementations,
			&factories.storage_factories,
		)?;
		let storage = Arc::new(StorageService::new(storage_backend));

		let queue_backend = create_primary(
			"queue",
			&self.config.queue.primary,
			&self.config.queue.implementations,
			&factories.queue_factories,
		)?;
		let queue = Arc::new(QueueService::new(queue_backend));

		let fulfillment_backend = create_primary(
			"fulfillment",
			&self.config.fulfillment.primary,
			&self.config.fulfillment.implementations,
			&factories.fulfillment_factories,
		)?;
		let policy = RetryPolicy::new(self.config.fulfillment.max_receive_count);
		tracing::info!(
			component = "fulfillment",
			max_receive_count = policy.max_receive_count(),
			"Retry policy configured"
		);
		let fulfillment = Arc::new(FulfillmentService::new(fulfillment_backend, policy));

		Ok(OrderEngine::new(
			self.config,
			storage,
			queue,
			fulfillment,
			EventBus::new(EVENT_BUS_CAPACITY),
		))
	}
}

/// Creates every configured implementation that has a factory and returns
/// the primary one.
fn create_primary<T, E, F>(
	component: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
) -> Result<T, BuilderError>
where
	E: Display,
	F: Fn(&toml::Value) -> Result<T, E>,
{
	let mut created = HashMap::new();
	for (name, config) in implementations {
		let Some(factory) = factories.get(name) else {
			tracing::warn!(component = %component, implementation = %name, "No factory registered");
			continue;
		};

		match factory(config) {
			Ok(implementation) => {
				// Validation already happened in the factory
				created.insert(name.clone(), implementation);
				let is_primary = primary == name;
				tracing::info!(component = %component, implementation = %name, enabled = %is_primary, "Loaded");
			},
			Err(e) => {
				tracing::error!(
					component = %component,
					implementation = %name,
					error = %e,
					"Failed to create implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
		}
	}

	if created.is_empty() {
		return Err(BuilderError::MissingComponent(format!(
			"No valid {} implementations available",
			component
		)));
	}

	created.remove(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' failed to load or has invalid configuration",
			component, primary
		))
	})
}
