//! Storage module for the portal system.
//!
//! This module provides abstractions for persistent storage of portal
//! data, supporting different backend implementations such as in-memory
//! or file-based storage. The backend interface exposes compare-and-swap
//! so every read-modify-write of shared state (order status, stock
//! counts, sequence counters) is safe against lost updates.

use async_trait::async_trait;
use portal_types::{ConfigSchema, ImplementationRegistry};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Upper bound on compare-and-swap retries before giving up.
const MAX_CAS_RETRIES: usize = 16;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// A requested item was not found.
	#[error("Not found")]
	NotFound,
	/// Serialization or deserialization failed.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// The storage backend failed.
	#[error("Backend error: {0}")]
	Backend(String),
	/// A compare-and-swap loop kept losing to concurrent writers.
	#[error("Contention on key: {0}")]
	Contention(String),
	/// Configuration validation failed.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the low-level interface for storage backends.
///
/// Backends provide basic key-value operations with optional TTL, prefix
/// listing, and an atomic compare-and-swap primitive.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes with optional time-to-live.
	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError>;

	/// Atomically replaces the value at `key` only if the stored bytes
	/// currently equal `expected`. `expected = None` means the key must
	/// not exist. Returns false when the precondition did not hold.
	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Lists all keys starting with the given prefix.
	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Removes expired entries from storage (optional operation).
	/// Returns the number of entries removed.
	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		Ok(0) // Default for backends without TTL support
	}
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// High-level storage service that provides typed operations.
///
/// Wraps a low-level backend with JSON serialization and a bounded
/// compare-and-swap retry loop for read-modify-write sequences.
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

	/// Inserts a value only if the key does not exist yet.
	///
	/// Returns false when the key was already present.
	pub async fn insert_new<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<bool, StorageError> {
		self.insert_new_with_ttl(namespace, id, data, None).await
	}

	/// Inserts a value only if the key does not exist yet, with an optional
	/// time-to-live.
	///
	/// Returns false when the key was already present.
	pub async fn insert_new_with_ttl<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend
			.compare_and_swap(&Self::key(namespace, id), None, bytes, ttl)
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

	/// Retrieves a value together with the raw bytes it was stored as.
	///
	/// The bytes act as a version token for [`StorageService::replace_versioned`],
	/// letting callers run their own validate-then-swap loops.
	pub async fn retrieve_versioned<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<(T, Vec<u8>), StorageError> {
		let bytes = self.backend.get_bytes(&Self::key(namespace, id)).await?;
		let value = serde_json::from_slice(&bytes)
			.map_err(|e| StorageError::Serialization(e.to_string()))?;
		Ok((value, bytes))
	}

	/// Replaces a value only if it still serializes from `prior`.
	///
	/// Returns false when a concurrent writer got there first; the caller
	/// should re-read and retry.
	pub async fn replace_versioned<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		prior: &[u8],
		data: &T,
	) -> Result<bool, StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend
			.compare_and_swap(&Self::key(namespace, id), Some(prior), bytes, None)
			.await
	}

	/// Applies an infallible mutation to a stored value inside a bounded
	/// compare-and-swap retry loop, returning the updated value.
	pub async fn mutate<T, F>(&self, namespace: &str, id: &str, mut f: F) -> Result<T, StorageError>
	where
		T: Serialize + DeserializeOwned,
		F: FnMut(&mut T),
	{
		for _ in 0..MAX_CAS_RETRIES {
			let (mut value, prior) = self.retrieve_versioned::<T>(namespace, id).await?;
			f(&mut value);
			if self
				.replace_versioned(namespace, id, &prior, &value)
				.await?
			{
				return Ok(value);
			}
		}
		Err(StorageError::Contention(Self::key(namespace, id)))
	}

	/// Removes a value from storage.
	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&Self::key(namespace, id)).await
	}

	/// Checks if a value exists in storage.
	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&Self::key(namespace, id)).await
	}

	/// Lists the ids stored under a namespace.
	pub async fn list_ids(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
		let prefix = format!("{}:", namespace);
		let keys = self.backend.list_keys(&prefix).await?;
		Ok(keys
			.into_iter()
			.filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
			.collect())
	}

	/// Retrieves every value stored under a namespace.
	///
	/// Entries that expire between listing and retrieval are skipped.
	pub async fn list_all<T: DeserializeOwned>(
		&self,
		namespace: &str,
	) -> Result<Vec<T>, StorageError> {
		let mut values = Vec::new();
		for id in self.list_ids(namespace).await? {
			match self.retrieve(namespace, &id).await {
				Ok(value) => values.push(value),
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e),
			}
		}
		Ok(values)
	}

	/// Removes expired entries from storage.
	pub async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.backend.cleanup_expired().await
	}
}

#[cfg(test)]
mod tests {
	use super::implementations::memory::MemoryStorage;
	use super::*;
	use serde::Deserialize;

	#[derive(Debug, Serialize, Deserialize, PartialEq)]
	struct Counter {
		value: u64,
	}

	fn service() -> StorageService {
		StorageService::new(Box::new(MemoryStorage::new()))
	}

	#[tokio::test]
	async fn mutate_applies_and_returns_updated_value() {
		let storage = service();
		storage
			.store("counters", "orders", &Counter { value: 41 })
			.await
			.unwrap();

		let updated = storage
			.mutate::<Counter, _>("counters", "orders", |c| c.value += 1)
			.await
			.unwrap();
		assert_eq!(updated.value, 42);

		let stored: Counter = storage.retrieve("counters", "orders").await.unwrap();
		assert_eq!(stored.value, 42);
	}

	#[tokio::test]
	async fn insert_new_rejects_existing_key() {
		let storage = service();
		assert!(storage
			.insert_new("counters", "orders", &Counter { value: 1 })
			.await
			.unwrap());
		assert!(!storage
			.insert_new("counters", "orders", &Counter { value: 2 })
			.await
			.unwrap());

		let stored: Counter = storage.retrieve("counters", "orders").await.unwrap();
		assert_eq!(stored.value, 1);
	}

	#[tokio::test]
	async fn insert_new_with_ttl_frees_the_key_after_expiry() {
		let storage = service();
		assert!(storage
			.insert_new_with_ttl(
				"sweep_marks",
				"ord-1:reminder:2026-09-05",
				&true,
				Some(Duration::from_millis(10)),
			)
			.await
			.unwrap());
		tokio::time::sleep(Duration::from_millis(30)).await;

		// The expired marker no longer blocks a fresh insert
		assert!(storage
			.insert_new("sweep_marks", "ord-1:reminder:2026-09-05", &true)
			.await
			.unwrap());
	}

	#[tokio::test]
	async fn replace_versioned_detects_interleaved_write() {
		let storage = service();
		storage
			.store("counters", "orders", &Counter { value: 1 })
			.await
			.unwrap();

		let (_, prior) = storage
			.retrieve_versioned::<Counter>("counters", "orders")
			.await
			.unwrap();

		// Interleaved writer bumps the value
		storage
			.store("counters", "orders", &Counter { value: 5 })
			.await
			.unwrap();

		let swapped = storage
			.replace_versioned("counters", "orders", &prior, &Counter { value: 2 })
			.await
			.unwrap();
		assert!(!swapped);

		let stored: Counter = storage.retrieve("counters", "orders").await.unwrap();
		assert_eq!(stored.value, 5);
	}

	#[tokio::test]
	async fn list_ids_scopes_to_namespace() {
		let storage = service();
		storage
			.store("orders", "a", &Counter { value: 1 })
			.await
			.unwrap();
		storage
			.store("orders", "b", &Counter { value: 2 })
			.await
			.unwrap();
		storage
			.store("products", "c", &Counter { value: 3 })
			.await
			.unwrap();

		let mut ids = storage.list_ids("orders").await.unwrap();
		ids.sort();
		assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
	}
}
