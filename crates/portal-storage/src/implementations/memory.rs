//! In-memory storage backend for the portal service.
//!
//! This module provides a memory-based implementation of the
//! StorageInterface trait, useful for testing and development scenarios
//! where persistence is not required.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use portal_types::{ConfigSchema, ImplementationRegistry, Schema, ValidationError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// In-memory storage implementation.
///
/// Stores data in a HashMap behind a read-write lock. Entries with a TTL
/// carry an expiry instant and are filtered on read until the cleanup
/// pass removes them.
pub struct MemoryStorage {
	/// The in-memory store protected by a read-write lock.
	store: Arc<RwLock<HashMap<String, Entry>>>,
}

struct Entry {
	value: Vec<u8>,
	expires_at: Option<Instant>,
}

impl Entry {
	fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
		Self {
			value,
			expires_at: ttl.map(|d| Instant::now() + d),
		}
	}

	fn is_expired(&self) -> bool {
		self.expires_at.is_some_and(|at| Instant::now() >= at)
	}
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
		match store.get(key) {
			Some(entry) if !entry.is_expired() => Ok(entry.value.clone()),
			_ => Err(StorageError::NotFound),
		}
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

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError> {
		let mut store = self.store.write().await;
		let current = store.get(key).filter(|e| !e.is_expired());

		let matches = match (current, expected) {
			(None, None) => true,
			(Some(entry), Some(bytes)) => entry.value == bytes,
			_ => false,
		};

		if matches {
			store.insert(key.to_string(), Entry::new(value, ttl));
		}
		Ok(matches)
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let store = self.store.read().await;
		Ok(store.get(key).is_some_and(|e| !e.is_expired()))
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let store = self.store.read().await;
		Ok(store
			.iter()
			.filter(|(k, e)| k.starts_with(prefix) && !e.is_expired())
			.map(|(k, _)| k.clone())
			.collect())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let mut store = self.store.write().await;
		let before = store.len();
		store.retain(|_, e| !e.is_expired());
		Ok(before - store.len())
	}
}

/// Configuration schema for MemoryStorage.
pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		// Memory storage has no required configuration
		let schema = Schema::new(vec![], vec![]);
		schema.validate(config)
	}
}

/// Registry for the memory storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

/// Factory function to create a memory storage backend from configuration.
///
/// Configuration parameters:
/// - None required for memory storage
pub fn create_storage(_config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	Ok(Box::new(MemoryStorage::new()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn basic_operations() {
		let storage = MemoryStorage::new();

		let key = "orders:o-1";
		let value = b"payload".to_vec();
		storage.set_bytes(key, value.clone(), None).await.unwrap();

		let retrieved = storage.get_bytes(key).await.unwrap();
		assert_eq!(retrieved, value);
		assert!(storage.exists(key).await.unwrap());

		storage.delete(key).await.unwrap();
		assert!(!storage.exists(key).await.unwrap());
		assert!(matches!(
			storage.get_bytes(key).await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn compare_and_swap_enforces_precondition() {
		let storage = MemoryStorage::new();
		let key = "counters:orders";

		// Insert-if-absent succeeds once
		assert!(storage
			.compare_and_swap(key, None, b"1".to_vec(), None)
			.await
			.unwrap());
		assert!(!storage
			.compare_and_swap(key, None, b"2".to_vec(), None)
			.await
			.unwrap());

		// Swap only with the matching prior value
		assert!(!storage
			.compare_and_swap(key, Some(b"9"), b"2".to_vec(), None)
			.await
			.unwrap());
		assert!(storage
			.compare_and_swap(key, Some(b"1"), b"2".to_vec(), None)
			.await
			.unwrap());
		assert_eq!(storage.get_bytes(key).await.unwrap(), b"2".to_vec());
	}

	#[tokio::test]
	async fn expired_entries_are_invisible_and_cleaned() {
		let storage = MemoryStorage::new();
		let key = "sweep_marks:o-1_reminder";

		storage
			.set_bytes(key, b"x".to_vec(), Some(Duration::from_millis(10)))
			.await
			.unwrap();
		tokio::time::sleep(Duration::from_millis(30)).await;

		assert!(!storage.exists(key).await.unwrap());
		assert!(storage.list_keys("sweep_marks:").await.unwrap().is_empty());
		assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
	}

	#[tokio::test]
	async fn list_keys_filters_by_prefix() {
		let storage = MemoryStorage::new();
		storage
			.set_bytes("orders:a", b"1".to_vec(), None)
			.await
			.unwrap();
		storage
			.set_bytes("products:b", b"2".to_vec(), None)
			.await
			.unwrap();

		let keys = storage.list_keys("orders:").await.unwrap();
		assert_eq!(keys, vec!["orders:a".to_string()]);
	}
}
