//! Configuration module for the order pipeline.
//!
//! This module provides structures and utilities for managing pipeline configuration.
//! It supports loading configuration from TOML files and provides validation to ensure
//! all required configuration values are properly set.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files for better organization:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

#[cfg(any(test, feature = "testing"))]
mod builders;
mod loader;

#[cfg(any(test, feature = "testing"))]
pub use builders::config::ConfigBuilder;

use order_types::StorageKey;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the order pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this service instance.
	pub service: ServiceConfig,
	/// Configuration for the key-value store.
	pub storage: StorageConfig,
	/// Configuration for the fulfillment work queue.
	pub queue: QueueConfig,
	/// Configuration for fulfillment attempts and the retry budget.
	pub fulfillment: FulfillmentConfig,
	/// Worker loop tuning.
	#[serde(default)]
	pub engine: EngineConfig,
	/// Configuration for the HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Configuration specific to the service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Unique identifier for this instance, used in logs.
	pub id: String,
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Interval in seconds for cleaning up expired storage entries.
	#[serde(default = "default_cleanup_interval_seconds")]
	pub cleanup_interval_seconds: u64,
	/// Namespace of live order records.
	#[serde(default = "default_orders_store")]
	pub orders_store: String,
	/// Namespace of quarantined orders.
	#[serde(default = "default_dead_letter_store")]
	pub dead_letter_store: String,
	/// Namespace of orchestration execution records.
	#[serde(default = "default_executions_store")]
	pub executions_store: String,
	/// Retention of live order records, in days.
	#[serde(default = "default_order_ttl_days")]
	pub order_ttl_days: u64,
	/// Retention of quarantine records, in days.
	#[serde(default = "default_quarantine_ttl_days")]
	pub quarantine_ttl_days: u64,
}

fn default_cleanup_interval_seconds() -> u64 {
	3600
}

fn default_orders_store() -> String {
	StorageKey::Orders.as_str().to_string()
}

fn default_dead_letter_store() -> String {
	StorageKey::FailedOrders.as_str().to_string()
}

fn default_executions_store() -> String {
	StorageKey::Executions.as_str().to_string()
}

fn default_order_ttl_days() -> u64 {
	90
}

fn default_quarantine_ttl_days() -> u64 {
	365
}

/// Configuration for the fulfillment work queue.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of queue implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Maximum number of messages fetched per poll.
	#[serde(default = "default_batch_size")]
	pub batch_size: usize,
	/// Seconds a received message stays invisible before it is redelivered.
	#[serde(default = "default_visibility_timeout_seconds")]
	pub visibility_timeout_seconds: u64,
	/// Delay between polls of an empty queue, in milliseconds.
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
}

fn default_batch_size() -> usize {
	10
}

fn default_visibility_timeout_seconds() -> u64 {
	30
}

fn default_poll_interval_ms() -> u64 {
	500
}

/// Configuration for fulfillment attempts.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FulfillmentConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of fulfillment implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Receive count at which a failing order is quarantined.
	#[serde(default = "default_max_receive_count")]
	pub max_receive_count: u32,
}

fn default_max_receive_count() -> u32 {
	3
}

/// Worker loop tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
	/// Maximum number of deliveries handled concurrently.
	#[serde(default = "default_max_concurrent_tasks")]
	pub max_concurrent_tasks: usize,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			max_concurrent_tasks: default_max_concurrent_tasks(),
		}
	}
}

fn default_max_concurrent_tasks() -> usize {
	32
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	/// Maximum request size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
}

/// Returns the default API host.
fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

/// Returns the default API port.
fn default_api_port() -> u16 {
	3000
}

/// Returns the default API timeout in seconds.
fn default_api_timeout() -> u64 {
	30
}

/// Returns the default maximum request size in bytes (1MB).
fn default_max_request_size() -> usize {
	1024 * 1024
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match default_value {
				Some(default) => default.to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				},
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

/// Checks the `primary` + `implementations` layout shared by pluggable sections.
fn validate_pluggable(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

impl Config {
	/// Loads configuration from a file with async environment variable resolution.
	///
	/// This method supports modular configuration through include directives:
	/// - `include = ["file1.toml", "file2.toml"]` - Include specific files
	///
	/// Each top-level section must be unique across all configuration files.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Validates the configuration to ensure all required fields are properly set.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		validate_pluggable("storage", &self.storage.primary, &self.storage.implementations)?;
		if self.storage.cleanup_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds must be greater than 0".into(),
			));
		}
		if self.storage.cleanup_interval_seconds > 86400 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds cannot exceed 86400 (24 hours)".into(),
			));
		}
		let stores = [
			&self.storage.orders_store,
			&self.storage.dead_letter_store,
			&self.storage.executions_store,
		];
		if stores.iter().any(|s| s.is_empty() || s.contains(':')) {
			return Err(ConfigError::Validation(
				"Store names must be non-empty and must not contain ':'".into(),
			));
		}
		if stores[0] == stores[1] || stores[0] == stores[2] || stores[1] == stores[2] {
			return Err(ConfigError::Validation(
				"orders_store, dead_letter_store and executions_store must be distinct".into(),
			));
		}
		if self.storage.order_ttl_days == 0 || self.storage.quarantine_ttl_days == 0 {
			return Err(ConfigError::Validation(
				"Storage retention periods must be at least 1 day".into(),
			));
		}

		validate_pluggable("queue", &self.queue.primary, &self.queue.implementations)?;
		if self.queue.batch_size == 0 {
			return Err(ConfigError::Validation(
				"Queue batch_size must be at least 1".into(),
			));
		}
		if self.queue.visibility_timeout_seconds == 0 {
			return Err(ConfigError::Validation(
				"Queue visibility_timeout_seconds must be greater than 0".into(),
			));
		}

		validate_pluggable(
			"fulfillment",
			&self.fulfillment.primary,
			&self.fulfillment.implementations,
		)?;
		if self.fulfillment.max_receive_count == 0 {
			return Err(ConfigError::Validation(
				"fulfillment max_receive_count must be at least 1".into(),
			));
		}

		self.validate_redrive_budget()?;

		if self.engine.max_concurrent_tasks == 0 {
			return Err(ConfigError::Validation(
				"engine max_concurrent_tasks must be at least 1".into(),
			));
		}

		Ok(())
	}

	/// Ensures the transport does not give up on a message before the
	/// fulfillment handler has had the chance to quarantine it.
	fn validate_redrive_budget(&self) -> Result<(), ConfigError> {
		let redrive = self
			.queue
			.implementations
			.get(&self.queue.primary)
			.and_then(|v| v.get("max_receive_count"))
			.and_then(|v| v.as_integer());

		if let Some(redrive) = redrive {
			if redrive < i64::from(self.fulfillment.max_receive_count) {
				return Err(ConfigError::Validation(format!(
					"Queue '{}' redrives after {} receives, before fulfillment max_receive_count {}",
					self.queue.primary, redrive, self.fulfillment.max_receive_count
				)));
			}
		}
		Ok(())
	}
}

/// Implementation of FromStr trait for Config to enable parsing from string.
///
/// Environment variables are resolved and the configuration is automatically
/// validated after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const MINIMAL: &str = r#"
[service]
id = "order-pipeline"

[storage]
primary = "memory"
[storage.implementations.memory]

[queue]
primary = "memory"
[queue.implementations.memory]

[fulfillment]
primary = "simulated"
[fulfillment.implementations.simulated]
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("ORDER_TEST_HOST", "localhost");
		std::env::set_var("ORDER_TEST_PORT", "5432");

		let input = "host = \"${ORDER_TEST_HOST}:${ORDER_TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "host = \"localhost:5432\"");

		std::env::remove_var("ORDER_TEST_HOST");
		std::env::remove_var("ORDER_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${ORDER_MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${ORDER_MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.unwrap_err().to_string().contains("ORDER_MISSING_VAR"));
	}

	#[test]
	fn test_defaults_applied() {
		let config: Config = MINIMAL.parse().unwrap();

		assert_eq!(config.storage.orders_store, "orders");
		assert_eq!(config.storage.dead_letter_store, "failed_orders");
		assert_eq!(config.storage.executions_store, "executions");
		assert_eq!(config.storage.order_ttl_days, 90);
		assert_eq!(config.storage.quarantine_ttl_days, 365);
		assert_eq!(config.fulfillment.max_receive_count, 3);
		assert_eq!(config.queue.visibility_timeout_seconds, 30);
		assert_eq!(config.engine.max_concurrent_tasks, 32);
		assert!(config.api.is_none());
	}

	#[test]
	fn test_config_with_env_vars() {
		std::env::set_var("ORDER_TEST_DLQ", "quarantine");

		let config_str = format!(
			"{}\n{}",
			MINIMAL.replace(
				"[storage]\n",
				"[storage]\ndead_letter_store = \"${ORDER_TEST_DLQ}\"\n"
			),
			"[api]\nenabled = true\nport = ${ORDER_TEST_API_PORT:-8080}\n"
		);
		let config: Config = config_str.parse().unwrap();

		assert_eq!(config.storage.dead_letter_store, "quarantine");
		let api = config.api.unwrap();
		assert!(api.enabled);
		assert_eq!(api.port, 8080);
		assert_eq!(api.host, "127.0.0.1");

		std::env::remove_var("ORDER_TEST_DLQ");
	}

	#[test]
	fn test_primary_must_be_configured() {
		let config_str = MINIMAL.replace("primary = \"simulated\"", "primary = \"remote\"");
		let err = config_str.parse::<Config>().unwrap_err();
		assert!(err
			.to_string()
			.contains("Primary fulfillment 'remote' not found"));
	}

	#[test]
	fn test_store_names_must_be_distinct() {
		let config_str = MINIMAL.replace(
			"[storage]\n",
			"[storage]\ndead_letter_store = \"orders\"\n",
		);
		assert!(config_str.parse::<Config>().is_err());
	}

	#[test]
	fn test_zero_retry_budget_rejected() {
		let config_str = MINIMAL.replace(
			"[fulfillment]\n",
			"[fulfillment]\nmax_receive_count = 0\n",
		);
		assert!(config_str.parse::<Config>().is_err());
	}

	#[test]
	fn test_redrive_below_retry_budget_rejected() {
		let config_str = MINIMAL.replace(
			"[queue.implementations.memory]\n",
			"[queue.implementations.memory]\nmax_receive_count = 2\n",
		);
		let err = config_str.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("redrives after 2 receives"));

		let config_str = MINIMAL.replace(
			"[queue.implementations.memory]\n",
			"[queue.implementations.memory]\nmax_receive_count = 5\n",
		);
		assert!(config_str.parse::<Config>().is_ok());
	}
}
