//! File-based storage backend.
//!
//! Each key is stored as one file under the configured directory. Files start
//! with a fixed-size header carrying the expiry time so expired entries can be
//! detected and swept without parsing their payload.

use crate::{merge_fields, StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use order_types::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;

#[allow(clippy::doc_nested_refdefs)]
/// Fixed-size file header for TTL support.
///
/// Binary layout (32 bytes total):
/// - [0-3]: Magic bytes "ORDS"
/// - [4-5]: Version (u16, little-endian)
/// - [6-13]: Expiration timestamp (i64, little-endian, Unix seconds, 0 = never)
/// - [14-31]: Reserved
#[derive(Debug, Clone, PartialEq)]
struct FileHeader {
	version: u16,
	expires_at: i64,
}

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"ORDS";
	const VERSION: u16 = 1;
	const SIZE: usize = 32;

	/// Creates a header expiring `ttl` from now; a zero TTL never expires.
	fn new(ttl: Duration) -> Self {
		let expires_at = if ttl.is_zero() {
			0
		} else {
			chrono::Utc::now()
				.timestamp()
				.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
		};

		Self {
			version: Self::VERSION,
			expires_at,
		}
	}

	fn serialize(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
		bytes[6..14].copy_from_slice(&self.expires_at.to_le_bytes());
		bytes
	}

	fn deserialize(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE {
			return Err(StorageError::Backend("File too small for header".into()));
		}
		if &bytes[0..4] != Self::MAGIC {
			return Err(StorageError::Backend("Unrecognized file format".into()));
		}

		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported file version: {}",
				version
			)));
		}

		let mut expires_bytes = [0u8; 8];
		expires_bytes.copy_from_slice(&bytes[6..14]);

		Ok(Self {
			version,
			expires_at: i64::from_le_bytes(expires_bytes),
		})
	}

	fn is_expired(&self) -> bool {
		self.expires_at != 0 && chrono::Utc::now().timestamp() >= self.expires_at
	}
}

/// Default TTLs per key namespace, read from `ttl_<namespace>` entries.
#[derive(Debug, Clone, Default)]
pub struct TtlConfig {
	ttls: HashMap<String, Duration>,
}

impl TtlConfig {
	fn from_config(config: &toml::Value) -> Self {
		let ttls = config
			.as_table()
			.map(|table| {
				table
					.iter()
					.filter_map(|(key, value)| {
						let namespace = key.strip_prefix("ttl_")?;
						let secs = u64::try_from(value.as_integer()?).ok()?;
						Some((namespace.to_string(), Duration::from_secs(secs)))
					})
					.collect()
			})
			.unwrap_or_default();

		Self { ttls }
	}

	/// TTL for a key, looked up by its namespace prefix (`orders:123` -> `orders`).
	fn ttl_for_key(&self, key: &str) -> Duration {
		let namespace = key.split(':').next().unwrap_or_default();
		self.ttls.get(namespace).copied().unwrap_or(Duration::ZERO)
	}
}

/// File-based storage implementation.
pub struct FileStorage {
	/// Base directory path for storing files.
	base_path: PathBuf,
	/// Default TTLs applied when a write does not specify one.
	ttl_config: TtlConfig,
	/// Serializes writers within this process.
	write_lock: Mutex<()>,
}

impl FileStorage {
	/// Creates a new FileStorage instance with the specified base path and TTL config.
	pub fn new(base_path: PathBuf, ttl_config: TtlConfig) -> Self {
		Self {
			base_path,
			ttl_config,
			write_lock: Mutex::new(()),
		}
	}

	/// Converts a storage key to a filesystem-safe file path.
	fn file_path(&self, key: &str) -> PathBuf {
		let safe_key = key.replace(['/', '\\', ':'], "_");
		self.base_path.join(format!("{}.bin", safe_key))
	}

	/// Encodes header and payload into the on-disk representation.
	fn encode(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Vec<u8> {
		let ttl = ttl.unwrap_or_else(|| self.ttl_config.ttl_for_key(key));
		let mut data = Vec::with_capacity(FileHeader::SIZE + value.len());
		data.extend_from_slice(&FileHeader::new(ttl).serialize());
		data.extend_from_slice(value);
		data
	}

	/// Writes `data` to a unique temporary file next to `path`.
	async fn write_temp(&self, path: &Path, data: Vec<u8>) -> Result<PathBuf, StorageError> {
		fs::create_dir_all(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		let temp_path = path.with_extension(format!("{}.tmp", temp_suffix()));
		fs::write(&temp_path, data)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		Ok(temp_path)
	}

	/// Reads and checks a file, returning its payload if it is still live.
	async fn read_live(&self, path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
		let data = match fs::read(path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let header = FileHeader::deserialize(&data)?;
		if header.is_expired() {
			return Ok(None);
		}
		Ok(Some(data[FileHeader::SIZE..].to_vec()))
	}

	/// Removes all expired files from storage.
	async fn cleanup_expired_files(&self) -> Result<usize, StorageError> {
		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let mut removed = 0;
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new("bin")) {
				continue;
			}

			let expired = match fs::read(&path).await {
				Ok(data) => FileHeader::deserialize(&data).is_ok_and(|h| h.is_expired()),
				Err(e) => {
					tracing::debug!("Skipping file {:?}: could not be read: {}", path, e);
					false
				},
			};

			if expired {
				match fs::remove_file(&path).await {
					Ok(()) => removed += 1,
					Err(e) => tracing::warn!("Failed to remove expired file {:?}: {}", path, e),
				}
			}
		}
		Ok(removed)
	}
}

/// Suffix that keeps concurrent temp files for the same key apart.
fn temp_suffix() -> String {
	use std::sync::atomic::{AtomicU64, Ordering};
	static COUNTER: AtomicU64 = AtomicU64::new(0);
	format!(
		"{}-{}",
		std::process::id(),
		COUNTER.fetch_add(1, Ordering::Relaxed)
	)
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.read_live(&self.file_path(key))
			.await?
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let path = self.file_path(key);
		let _guard = self.write_lock.lock().await;
		let temp_path = self.write_temp(&path, self.encode(key, &value, ttl)).await?;

		// Rename is atomic, readers see either the old or the new file
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn set_bytes_if_absent(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError> {
		let path = self.file_path(key);
		let _guard = self.write_lock.lock().await;

		// An expired file does not count as present.
		if fs::try_exists(&path).await.unwrap_or(false) && self.read_live(&path).await?.is_none() {
			let _ = fs::remove_file(&path).await;
		}

		let temp_path = self.write_temp(&path, self.encode(key, &value, ttl)).await?;

		// hard_link fails if the target exists, which makes the put-if-absent atomic
		let linked = fs::hard_link(&temp_path, &path).await;
		let _ = fs::remove_file(&temp_path).await;

		match linked {
			Ok(()) => Ok(true),
			Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn update_fields(
		&self,
		key: &str,
		fields: serde_json::Map<String, serde_json::Value>,
	) -> Result<Vec<u8>, StorageError> {
		let path = self.file_path(key);
		let _guard = self.write_lock.lock().await;

		let data = match fs::read(&path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(StorageError::NotFound)
			},
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};
		if FileHeader::deserialize(&data)?.is_expired() {
			return Err(StorageError::NotFound);
		}

		// The original header is kept so the expiry does not move
		let payload = merge_fields(&data[FileHeader::SIZE..], fields)?;
		let mut updated = Vec::with_capacity(FileHeader::SIZE + payload.len());
		updated.extend_from_slice(&data[..FileHeader::SIZE]);
		updated.extend_from_slice(&payload);

		let temp_path = self.write_temp(&path, updated).await?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		Ok(payload)
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock().await;
		match fs::remove_file(self.file_path(key)).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(self.read_live(&self.file_path(key)).await?.is_some())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.cleanup_expired_files().await
	}
}

/// Configuration schema for FileStorage.
///
/// Besides `storage_path`, any `ttl_<namespace>` integer (seconds) is accepted.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let mut optional_fields = vec![Field::new("storage_path", FieldType::String)
			.with_validator(|v| match v.as_str() {
				Some("") => Err("storage_path cannot be empty".to_string()),
				_ => Ok(()),
			})];

		if let Some(table) = config.as_table() {
			for key in table.keys().filter(|k| k.starts_with("ttl_")) {
				optional_fields.push(Field::new(
					key.clone(),
					FieldType::Integer {
						min: Some(0),
						max: None,
					},
				));
			}
		}

		Schema::new(vec![], optional_fields).validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for file storage (default: "./data/storage")
/// - `ttl_<namespace>`: default TTL in seconds for keys in that namespace (default: 0, never)
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");

	Ok(Box::new(FileStorage::new(
		PathBuf::from(storage_path),
		TtlConfig::from_config(config),
	)))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}
