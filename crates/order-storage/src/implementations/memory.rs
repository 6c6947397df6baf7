//! In-memory storage backend implementation.
//!
//! This module provides a memory-based implementation of the StorageInterface trait,
//! useful for testing and single-process deployments where persistence across
//! restarts is not required.

use crate::{merge_fields, StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use order_types::{ConfigSchema, ImplementationRegistry, Schema, ValidationError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// A stored value with its optional expiry deadline.
#[derive(Debug, Clone)]
struct Entry {
	value: Vec<u8>,
	expires_at: Option<Instant>,
}

impl Entry {
	fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
		let expires_at = ttl
			.filter(|ttl| !ttl.is_zero())
			.map(|ttl| Instant::now() + ttl);
		Self { value, expires_at }
	}

	fn is_expired(&self, now: Instant) -> bool {
		self.expires_at.is_some_and(|deadline| now >= deadline)
	}
}

/// In-memory storage implementation.
///
/// Expired entries are invisible to reads immediately and are physically
/// removed by [`StorageInterface::cleanup_expired`].
pub struct MemoryStorage {
	/// The in-memory store protected by a read-write lock.
	store: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryStorage {
	/// Creates a new MemoryStorage instance.
	pub fn new() -> Self {
		Self {
			store: Arc::new(RwLock::new(HashMap::new())),
		}
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let store = self.store.read().await;
		store
			.get(key)
			.filter(|entry| !entry.is_expired(Instant::now()))
			.map(|entry| entry.value.clone())
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.insert(key.to_string(), Entry::new(value, ttl));
		Ok(())
	}

	async fn set_bytes_if_absent(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError> {
		let mut store = self.store.write().await;
		if let Some(existing) = store.get(key) {
			if !existing.is_expired(Instant::now()) {
				return Ok(false);
			}
		}
		store.insert(key.to_string(), Entry::new(value, ttl));
		Ok(true)
	}

	async fn update_fields(
		&self,
		key: &str,
		fields: serde_json::Map<String, serde_json::Value>,
	) -> Result<Vec<u8>, StorageError> {
		let mut store = self.store.write().await;
		let entry = store
			.get_mut(key)
			.filter(|entry| !entry.is_expired(Instant::now()))
			.ok_or(StorageError::NotFound)?;
		entry.value = merge_fields(&entry.value, fields)?;
		Ok(entry.value.clone())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let store = self.store.read().await;
		Ok(store
			.get(key)
			.is_some_and(|entry| !entry.is_expired(Instant::now())))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let mut store = self.store.write().await;
		let now = Instant::now();
		let before = store.len();
		store.retain(|_, entry| !entry.is_expired(now));
		Ok(before - store.len())
	}
}

/// Configuration schema for MemoryStorage.
pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		// Memory storage has no configuration
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a memory storage backend from configuration.
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	MemoryStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStorage::new()))
}

/// Registry for the memory storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_basic_operations() {
		let storage = MemoryStorage::new();

		let key = "orders:o-1";
		let value = b"test_value".to_vec();
		storage.set_bytes(key, value.clone(), None).await.unwrap();

		assert_eq!(storage.get_bytes(key).await.unwrap(), value);
		assert!(storage.exists(key).await.unwrap());

		storage.delete(key).await.unwrap();
		assert!(!storage.exists(key).await.unwrap());
		assert!(matches!(
			storage.get_bytes(key).await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_overwrite() {
		let storage = MemoryStorage::new();

		let key = "overwrite_key";
		storage.set_bytes(key, b"value1".to_vec(), None).await.unwrap();
		storage.set_bytes(key, b"value2".to_vec(), None).await.unwrap();

		assert_eq!(storage.get_bytes(key).await.unwrap(), b"value2".to_vec());
	}

	#[tokio::test]
	async fn test_expired_entries_are_hidden_and_cleaned() {
		let storage = MemoryStorage::new();

		storage
			.set_bytes("short", b"a".to_vec(), Some(Duration::from_millis(10)))
			.await
			.unwrap();
		storage
			.set_bytes("forever", b"b".to_vec(), Some(Duration::ZERO))
			.await
			.unwrap();

		tokio::time::sleep(Duration::from_millis(30)).await;

		assert!(!storage.exists("short").await.unwrap());
		assert!(storage.exists("forever").await.unwrap());
		assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
		assert_eq!(storage.cleanup_expired().await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_if_absent_replaces_expired_entry() {
		let storage = MemoryStorage::new();

		storage
			.set_bytes("k", b"old".to_vec(), Some(Duration::from_millis(10)))
			.await
			.unwrap();
		assert!(!storage
			.set_bytes_if_absent("k", b"new".to_vec(), None)
			.await
			.unwrap());

		tokio::time::sleep(Duration::from_millis(30)).await;

		assert!(storage
			.set_bytes_if_absent("k", b"new".to_vec(), None)
			.await
			.unwrap());
		assert_eq!(storage.get_bytes("k").await.unwrap(), b"new".to_vec());
	}

	#[tokio::test]
	async fn test_update_fields_keeps_expiry() {
		let storage = MemoryStorage::new();
		storage
			.set_bytes("k", br#"{"a":1,"b":2}"#.to_vec(), Some(Duration::from_millis(20)))
			.await
			.unwrap();

		let mut fields = serde_json::Map::new();
		fields.insert("b".into(), serde_json::json!(3));
		let updated = storage.update_fields("k", fields.clone()).await.unwrap();
		let updated: serde_json::Value = serde_json::from_slice(&updated).unwrap();
		assert_eq!(updated, serde_json::json!({"a": 1, "b": 3}));

		tokio::time::sleep(Duration::from_millis(40)).await;

		assert!(matches!(
			storage.update_fields("k", fields).await,
			Err(StorageError::NotFound)
		));
	}

	#[test]
	fn test_factory_rejects_non_table() {
		let result = create_storage(&toml::Value::String("memory".into()));
		assert!(matches!(result, Err(StorageError::Configuration(_))));
	}
}
