//! Order persistence helpers.
//!
//! Thin wrapper over the storage service for order records. Every
//! read-modify-write goes through the compare-and-swap mutate helper so
//! concurrent edits never lose updates, and `updated_at` is stamped on the
//! way out.

use crate::utils::unix_now;
use portal_storage::{StorageError, StorageService};
use portal_types::{Order, StorageKey};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during order state management.
#[derive(Debug, Error)]
pub enum OrderStateError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Order not found: {0}")]
	OrderNotFound(String),
}

impl OrderStateError {
	fn from_storage(e: StorageError, order_id: &str) -> Self {
		match e {
			StorageError::NotFound => OrderStateError::OrderNotFound(order_id.to_string()),
			other => OrderStateError::Storage(other.to_string()),
		}
	}
}

/// Manages order persistence with compare-and-swap semantics.
pub struct OrderStateMachine {
	storage: Arc<StorageService>,
}

impl OrderStateMachine {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Updates an order with a closure inside a CAS retry loop and persists it.
	pub async fn update_order_with<F>(
		&self,
		order_id: &str,
		mut updater: F,
	) -> Result<Order, OrderStateError>
	where
		F: FnMut(&mut Order),
	{
		self.storage
			.mutate(StorageKey::Orders.as_str(), order_id, |order: &mut Order| {
				updater(order);
				order.updated_at = unix_now();
			})
			.await
			.map_err(|e| OrderStateError::from_storage(e, order_id))
	}

	/// Gets an order by ID.
	pub async fn get_order(&self, order_id: &str) -> Result<Order, OrderStateError> {
		self.storage
			.retrieve(StorageKey::Orders.as_str(), order_id)
			.await
			.map_err(|e| OrderStateError::from_storage(e, order_id))
	}

	/// Stores a new order, failing if the id is already taken.
	pub async fn store_order(&self, order: &Order) -> Result<(), OrderStateError> {
		let inserted = self
			.storage
			.insert_new(StorageKey::Orders.as_str(), &order.id, order)
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))?;
		if !inserted {
			return Err(OrderStateError::Storage(format!(
				"Order id collision: {}",
				order.id
			)));
		}
		Ok(())
	}
}
