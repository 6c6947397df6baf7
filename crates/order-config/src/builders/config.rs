//! Configuration builder for creating test and development configurations.
//!
//! This module provides utilities for constructing Config instances with
//! sensible defaults, particularly useful for testing scenarios.

use crate::{
	ApiConfig, Config, EngineConfig, FulfillmentConfig, QueueConfig, ServiceConfig,
	StorageConfig,
};
use std::collections::HashMap;

/// Builder for creating `Config` instances with a fluent API.
///
/// Defaults select the in-memory storage and queue backends and the
/// scripted fulfillment backend, so tests control every outcome.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	service_id: String,
	storage_primary: String,
	storage_cleanup_interval_seconds: u64,
	queue_primary: String,
	visibility_timeout_seconds: u64,
	fulfillment_primary: String,
	fulfillment_config: toml::Value,
	max_receive_count: u32,
	max_concurrent_tasks: usize,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	/// Creates a new `ConfigBuilder` with default values suitable for testing.
	pub fn new() -> Self {
		Self {
			service_id: "test-pipeline".to_string(),
			storage_primary: "memory".to_string(),
			storage_cleanup_interval_seconds: 60,
			queue_primary: "memory".to_string(),
			visibility_timeout_seconds: 1,
			fulfillment_primary: "scripted".to_string(),
			fulfillment_config: toml::Value::Table(toml::map::Map::new()),
			max_receive_count: 3,
			max_concurrent_tasks: 4,
			api: None,
		}
	}

	/// Sets the service ID.
	pub fn service_id(mut self, id: impl Into<String>) -> Self {
		self.service_id = id.into();
		self
	}

	/// Sets the primary storage implementation.
	pub fn storage_primary(mut self, primary: impl Into<String>) -> Self {
		self.storage_primary = primary.into();
		self
	}

	/// Sets the storage cleanup interval in seconds.
	pub fn storage_cleanup_interval_seconds(mut self, interval: u64) -> Self {
		self.storage_cleanup_interval_seconds = interval;
		self
	}

	/// Sets the queue visibility timeout in seconds.
	pub fn visibility_timeout_seconds(mut self, seconds: u64) -> Self {
		self.visibility_timeout_seconds = seconds;
		self
	}

	/// Sets the primary fulfillment implementation and its configuration table.
	pub fn fulfillment(mut self, primary: impl Into<String>, config: toml::Value) -> Self {
		self.fulfillment_primary = primary.into();
		self.fulfillment_config = config;
		self
	}

	/// Sets the receive count at which failing orders are quarantined.
	pub fn max_receive_count(mut self, max: u32) -> Self {
		self.max_receive_count = max;
		self
	}

	/// Sets the worker concurrency limit.
	pub fn max_concurrent_tasks(mut self, max: usize) -> Self {
		self.max_concurrent_tasks = max;
		self
	}

	/// Sets the API configuration.
	pub fn api(mut self, api: Option<ApiConfig>) -> Self {
		self.api = api;
		self
	}

	/// Builds the `Config` with the configured values.
	pub fn build(self) -> Config {
		let empty = || toml::Value::Table(toml::map::Map::new());

		Config {
			service: ServiceConfig {
				id: self.service_id,
			},
			storage: StorageConfig {
				implementations: HashMap::from([(self.storage_primary.clone(), empty())]),
				primary: self.storage_primary,
				cleanup_interval_seconds: self.storage_cleanup_interval_seconds,
				orders_store: crate::default_orders_store(),
				dead_letter_store: crate::default_dead_letter_store(),
				executions_store: crate::default_executions_store(),
				order_ttl_days: crate::default_order_ttl_days(),
				quarantine_ttl_days: crate::default_quarantine_ttl_days(),
			},
			queue: QueueConfig {
				implementations: HashMap::from([(self.queue_primary.clone(), empty())]),
				primary: self.queue_primary,
				batch_size: crate::default_batch_size(),
				visibility_timeout_seconds: self.visibility_timeout_seconds,
				poll_interval_ms: 10,
			},
			fulfillment: FulfillmentConfig {
				implementations: HashMap::from([(
					self.fulfillment_primary.clone(),
					self.fulfillment_config,
				)]),
				primary: self.fulfillment_primary,
				max_receive_count: self.max_receive_count,
			},
			engine: EngineConfig {
				max_concurrent_tasks: self.max_concurrent_tasks,
			},
			api: self.api,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_built_config_is_valid() {
		let config = ConfigBuilder::new().max_receive_count(5).build();
		assert!(config.validate().is_ok());
		assert_eq!(config.fulfillment.primary, "scripted");
		assert_eq!(config.fulfillment.max_receive_count, 5);
		assert!(config.storage.implementations.contains_key("memory"));
	}
}
