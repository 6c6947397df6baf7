//! Storage module for the order pipeline.
//!
//! This module provides abstractions for the key-value store that holds live
//! orders, quarantined orders and execution records. Backends only deal in
//! raw bytes; [`StorageService`] adds namespacing and JSON (de)serialization.

use async_trait::async_trait;
use order_types::{ConfigSchema, ImplementationRegistry};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the low-level interface for storage backends.
///
/// Provides basic key-value operations with optional TTL support. A TTL of
/// `Duration::ZERO` means the entry never expires; `None` lets the backend
/// apply its own default for the key.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes with optional time-to-live, overwriting any previous value.
	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError>;

	/// Stores raw bytes only if no live value exists for the key.
	///
	/// Returns `true` when the value was written and `false` when the key was
	/// already present. The check and the write are atomic.
	async fn set_bytes_if_absent(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError>;

	/// Sets `fields` on the JSON object stored under `key` and returns the
	/// updated bytes.
	///
	/// Every other field and the entry's expiry are left as they are. The
	/// read and the write happen under the backend's write lock, so a
	/// concurrent writer's fields are never overwritten.
	async fn update_fields(
		&self,
		key: &str,
		fields: serde_json::Map<String, serde_json::Value>,
	) -> Result<Vec<u8>, StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Removes expired entries from storage (optional operation).
	/// Returns the number of entries removed.
	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		Ok(0)
	}
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
///
/// Returns a vector of (name, factory) tuples for all available storage implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Merges `fields` into the JSON object encoded in `bytes`.
pub(crate) fn merge_fields(
	bytes: &[u8],
	fields: serde_json::Map<String, serde_json::Value>,
) -> Result<Vec<u8>, StorageError> {
	let mut document: serde_json::Value =
		serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;
	let object = document
		.as_object_mut()
		.ok_or_else(|| StorageError::Serialization("stored value is not a JSON object".into()))?;
	object.extend(fields);
	serde_json::to_vec(&document).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// High-level storage service that provides typed operations.
///
/// The StorageService wraps a low-level storage backend and provides
/// convenient methods for storing and retrieving typed data with
/// automatic serialization/deserialization. Keys are `<namespace>:<id>`.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	fn key(namespace: &str, id: &str) -> String {
		format!("{}:{}", namespace, id)
	}

	/// Stores a serializable value with optional time-to-live.
	///
	/// Overwrites any existing value under the same key.
	pub async fn store_with_ttl<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend
			.set_bytes(&Self::key(namespace, id), bytes, ttl)
			.await
	}

	/// Stores a serializable value without time-to-live.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.store_with_ttl(namespace, id, data, None).await
	}

	/// Stores a serializable value unless one already exists under the key.
	///
	/// Returns `false` without touching the existing value when the key is taken.
	pub async fn store_if_absent<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend
			.set_bytes_if_absent(&Self::key(namespace, id), bytes, ttl)
			.await
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&Self::key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Retrieves a value as an untyped JSON document.
	///
	/// Used for narrow updates that must preserve fields the typed model
	/// does not know about.
	pub async fn retrieve_document(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<serde_json::Value, StorageError> {
		self.retrieve(namespace, id).await
	}

	/// Sets `fields` on a stored JSON object without rewriting the rest of it.
	///
	/// Returns the document as stored after the update.
	pub async fn update_fields(
		&self,
		namespace: &str,
		id: &str,
		fields: serde_json::Map<String, serde_json::Value>,
	) -> Result<serde_json::Value, StorageError> {
		let bytes = self
			.backend
			.update_fields(&Self::key(namespace, id), fields)
			.await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Removes a value from storage.
	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&Self::key(namespace, id)).await
	}

	/// Checks if a value exists in storage.
	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&Self::key(namespace, id)).await
	}

	/// Removes expired entries from storage.
	///
	/// Returns the number of entries that were removed.
	pub async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.backend.cleanup_expired().await
	}
}
