//! Stock commitment and line-item adjustment handler.
//!
//! Stock moves exactly once per order through the idempotent commit step,
//! guarded by the persisted `stock_committed` flag. Later line-item edits
//! adjust product stock by the signed quantity delta, and every stock write
//! goes through compare-and-swap so concurrent edits cannot lose updates.

use crate::handlers::order::require_staff;
use crate::handlers::LifecycleError;
use crate::utils::{truncate_id, unix_now};
use portal_storage::{StorageError, StorageService};
use portal_types::{ActorContext, Order, Product, StorageKey};
use std::sync::Arc;
use tracing::instrument;

/// Retries for validate-then-swap loops that race concurrent writers.
const MAX_SWAP_RETRIES: usize = 16;

/// Handler for stock commitment and line-item edits.
pub struct StockHandler {
	storage: Arc<StorageService>,
}

impl StockHandler {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Commits stock for an order's line items.
	///
	/// Idempotent: once `stock_committed` is set, later calls return the
	/// order untouched. Every line item is validated against current stock
	/// before any decrement, and a decrement that still fails mid-way (a
	/// concurrent writer drained the stock) rolls back the ones already
	/// applied, so stock is never partially committed.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn commit_stock(&self, order_id: &str) -> Result<Order, LifecycleError> {
		let (order, _) = self.retrieve_order_versioned(order_id).await?;
		if order.stock_committed {
			return Ok(order);
		}

		for item in &order.line_items {
			let product = self.retrieve_product(&item.product_id).await?;
			if product.stock_quantity < item.quantity {
				return Err(LifecycleError::InsufficientStock {
					product_id: item.product_id.clone(),
					available: product.stock_quantity,
					requested: item.quantity,
				});
			}
		}

		let mut applied: Vec<(String, u32)> = Vec::with_capacity(order.line_items.len());
		for item in &order.line_items {
			match self
				.adjust_stock(&item.product_id, -i64::from(item.quantity))
				.await
			{
				Ok(_) => applied.push((item.product_id.clone(), item.quantity)),
				Err(e) => {
					self.release_stock(&applied).await;
					return Err(e);
				},
			}
		}

		for _ in 0..MAX_SWAP_RETRIES {
			let (order, prior) = self.retrieve_order_versioned(order_id).await?;
			if order.stock_committed {
				// A concurrent commit won the flag; undo our decrements so
				// stock moves exactly once.
				self.release_stock(&applied).await;
				return Ok(order);
			}
			let mut updated = order;
			updated.stock_committed = true;
			updated.updated_at = unix_now();
			if self
				.storage
				.replace_versioned(StorageKey::Orders.as_str(), order_id, &prior, &updated)
				.await?
			{
				tracing::info!(
					order_id = %truncate_id(order_id),
					items = updated.line_items.len(),
					"Stock committed"
				);
				return Ok(updated);
			}
		}
		self.release_stock(&applied).await;
		Err(LifecycleError::Persistence(format!(
			"Contention on order {}",
			order_id
		)))
	}

	/// Changes a line item's quantity.
	///
	/// When stock has been committed, product stock is adjusted by the
	/// signed delta first; an increase that exceeds current stock fails with
	/// insufficient stock and leaves both records unchanged.
	pub async fn edit_line_item(
		&self,
		order_id: &str,
		index: usize,
		new_quantity: u32,
		actor: &ActorContext,
	) -> Result<Order, LifecycleError> {
		require_staff(actor)?;
		if new_quantity == 0 {
			return Err(LifecycleError::Validation(
				"Quantity must be greater than zero; delete the line item instead".into(),
			));
		}

		for _ in 0..MAX_SWAP_RETRIES {
			let (order, prior) = self.retrieve_order_versioned(order_id).await?;
			let item = order.line_items.get(index).ok_or_else(|| {
				LifecycleError::Validation(format!("No line item at index {}", index))
			})?;
			let delta = i64::from(new_quantity) - i64::from(item.quantity);
			let product_id = item.product_id.clone();

			if order.stock_committed && delta != 0 {
				self.adjust_stock(&product_id, -delta).await?;
			}

			let mut updated = order;
			updated.line_items[index].quantity = new_quantity;
			updated.updated_at = unix_now();
			if self
				.storage
				.replace_versioned(StorageKey::Orders.as_str(), order_id, &prior, &updated)
				.await?
			{
				return Ok(updated);
			}
			// Lost the order write; give the stock back before retrying.
			if updated.stock_committed && delta != 0 {
				self.release_delta(&product_id, delta).await;
			}
		}
		Err(LifecycleError::Persistence(format!(
			"Contention on order {}",
			order_id
		)))
	}

	/// Removes a line item, returning its stock when committed.
	pub async fn delete_line_item(
		&self,
		order_id: &str,
		index: usize,
		actor: &ActorContext,
	) -> Result<Order, LifecycleError> {
		require_staff(actor)?;

		for _ in 0..MAX_SWAP_RETRIES {
			let (order, prior) = self.retrieve_order_versioned(order_id).await?;
			let item = order.line_items.get(index).ok_or_else(|| {
				LifecycleError::Validation(format!("No line item at index {}", index))
			})?;
			let quantity = item.quantity;
			let product_id = item.product_id.clone();

			if order.stock_committed {
				self.adjust_stock(&product_id, i64::from(quantity)).await?;
			}

			let mut updated = order;
			updated.line_items.remove(index);
			updated.updated_at = unix_now();
			if self
				.storage
				.replace_versioned(StorageKey::Orders.as_str(), order_id, &prior, &updated)
				.await?
			{
				return Ok(updated);
			}
			if updated.stock_committed {
				self.release_delta(&product_id, i64::from(quantity)).await;
			}
		}
		Err(LifecycleError::Persistence(format!(
			"Contention on order {}",
			order_id
		)))
	}

	/// Adjusts a product's stock by a signed delta under compare-and-swap.
	///
	/// Negative deltas fail with insufficient stock rather than going below
	/// zero.
	async fn adjust_stock(
		&self,
		product_id: &str,
		delta: i64,
	) -> Result<Product, LifecycleError> {
		for _ in 0..MAX_SWAP_RETRIES {
			let (product, prior) = self
				.storage
				.retrieve_versioned::<Product>(StorageKey::Products.as_str(), product_id)
				.await
				.map_err(|e| match e {
					StorageError::NotFound => LifecycleError::Validation(format!(
						"Unknown product: {}",
						product_id
					)),
					other => LifecycleError::Persistence(other.to_string()),
				})?;

			let next = i64::from(product.stock_quantity) + delta;
			if next < 0 {
				return Err(LifecycleError::InsufficientStock {
					product_id: product_id.to_string(),
					available: product.stock_quantity,
					requested: (-delta) as u32,
				});
			}

			let mut updated = product;
			updated.stock_quantity = next as u32;
			if self
				.storage
				.replace_versioned(StorageKey::Products.as_str(), product_id, &prior, &updated)
				.await?
			{
				return Ok(updated);
			}
		}
		Err(LifecycleError::Persistence(format!(
			"Contention on product {}",
			product_id
		)))
	}

	/// Returns previously decremented stock after a failed commit.
	async fn release_stock(&self, applied: &[(String, u32)]) {
		for (product_id, quantity) in applied {
			self.release_delta(product_id, -i64::from(*quantity)).await;
		}
	}

	/// Undoes a signed stock adjustment, logging rather than failing.
	async fn release_delta(&self, product_id: &str, delta: i64) {
		if let Err(e) = self.adjust_stock(product_id, delta).await {
			tracing::warn!(
				product_id = %product_id,
				delta,
				error = %e,
				"Failed to roll back stock adjustment"
			);
		}
	}

	async fn retrieve_order_versioned(
		&self,
		order_id: &str,
	) -> Result<(Order, Vec<u8>), LifecycleError> {
		self.storage
			.retrieve_versioned(StorageKey::Orders.as_str(), order_id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => {
					LifecycleError::NotFound(format!("Order not found: {}", order_id))
				},
				other => LifecycleError::Persistence(other.to_string()),
			})
	}

	async fn retrieve_product(&self, product_id: &str) -> Result<Product, LifecycleError> {
		self.storage
			.retrieve(StorageKey::Products.as_str(), product_id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => {
					LifecycleError::Validation(format!("Unknown product: {}", product_id))
				},
				other => LifecycleError::Persistence(other.to_string()),
			})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use portal_storage::implementations::memory::MemoryStorage;
	use portal_types::{
		DemoStatus, FulfillmentInfo, LineItem, OrderStatus, Role, ShippingInfo,
	};

	fn staff() -> ActorContext {
		ActorContext {
			id: "acct-sm".to_string(),
			email: "sm@example.com".to_string(),
			role: Role::ShopManager,
		}
	}

	fn product(id: &str, stock: u32) -> Product {
		Product {
			id: id.to_string(),
			name: format!("Product {}", id),
			sku: format!("SKU-{}", id),
			brand: "Acme".to_string(),
			processor: "X1".to_string(),
			memory: "16GB".to_string(),
			stock_quantity: stock,
		}
	}

	fn order_with(items: Vec<LineItem>) -> Order {
		Order {
			id: "ord-1".to_string(),
			order_number: 1,
			status: OrderStatus::Pending,
			created_at: 0,
			updated_at: 0,
			units: 1,
			budget: 100.0,
			revenue: 100.0,
			account_id: None,
			quote_id: None,
			segment: None,
			manufacturer: None,
			reseller: false,
			shipping: ShippingInfo::default(),
			fulfillment: FulfillmentInfo::default(),
			line_items: items,
			approved_by: None,
			approved_at: None,
			stock_committed: false,
			demo_status: DemoStatus::Active,
			demo_expiry_date: None,
			returned_at: None,
		}
	}

	async fn setup(products: Vec<Product>, order: &Order) -> (Arc<StorageService>, StockHandler) {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		for product in &products {
			storage
				.store(StorageKey::Products.as_str(), &product.id, product)
				.await
				.unwrap();
		}
		storage
			.store(StorageKey::Orders.as_str(), &order.id, order)
			.await
			.unwrap();
		let handler = StockHandler::new(storage.clone());
		(storage, handler)
	}

	async fn stock_of(storage: &StorageService, id: &str) -> u32 {
		let product: Product = storage
			.retrieve(StorageKey::Products.as_str(), id)
			.await
			.unwrap();
		product.stock_quantity
	}

	#[tokio::test]
	async fn commit_decrements_once_and_is_idempotent() {
		let order = order_with(vec![product("p-1", 10).snapshot(3)]);
		let (storage, handler) = setup(vec![product("p-1", 10)], &order).await;

		let committed = handler.commit_stock(&order.id).await.unwrap();
		assert!(committed.stock_committed);
		assert_eq!(stock_of(&storage, "p-1").await, 7);

		// Second commit is a no-op
		let again = handler.commit_stock(&order.id).await.unwrap();
		assert!(again.stock_committed);
		assert_eq!(stock_of(&storage, "p-1").await, 7);
	}

	#[tokio::test]
	async fn commit_rejects_insufficient_stock_without_partial_decrement() {
		let order = order_with(vec![
			product("p-1", 10).snapshot(3),
			product("p-2", 1).snapshot(5),
		]);
		let (storage, handler) = setup(vec![product("p-1", 10), product("p-2", 1)], &order).await;

		let err = handler.commit_stock(&order.id).await.unwrap_err();
		assert!(matches!(
			err,
			LifecycleError::InsufficientStock {
				ref product_id,
				available: 1,
				requested: 5,
			} if product_id == "p-2"
		));

		assert_eq!(stock_of(&storage, "p-1").await, 10);
		assert_eq!(stock_of(&storage, "p-2").await, 1);
		let stored: Order = storage
			.retrieve(StorageKey::Orders.as_str(), &order.id)
			.await
			.unwrap();
		assert!(!stored.stock_committed);
	}

	#[tokio::test]
	async fn edit_before_commit_leaves_stock_alone() {
		let order = order_with(vec![product("p-1", 10).snapshot(3)]);
		let (storage, handler) = setup(vec![product("p-1", 10)], &order).await;

		let updated = handler
			.edit_line_item(&order.id, 0, 8, &staff())
			.await
			.unwrap();
		assert_eq!(updated.line_items[0].quantity, 8);
		assert_eq!(stock_of(&storage, "p-1").await, 10);
	}

	#[tokio::test]
	async fn edit_after_commit_applies_signed_delta() {
		let order = order_with(vec![product("p-1", 10).snapshot(3)]);
		let (storage, handler) = setup(vec![product("p-1", 10)], &order).await;
		handler.commit_stock(&order.id).await.unwrap();
		assert_eq!(stock_of(&storage, "p-1").await, 7);

		// Increase 3 -> 5 takes two more units
		handler
			.edit_line_item(&order.id, 0, 5, &staff())
			.await
			.unwrap();
		assert_eq!(stock_of(&storage, "p-1").await, 5);

		// Decrease 5 -> 1 gives four back
		handler
			.edit_line_item(&order.id, 0, 1, &staff())
			.await
			.unwrap();
		assert_eq!(stock_of(&storage, "p-1").await, 9);
	}

	#[tokio::test]
	async fn edit_increase_beyond_stock_changes_nothing() {
		let order = order_with(vec![product("p-1", 5).snapshot(3)]);
		let (storage, handler) = setup(vec![product("p-1", 5)], &order).await;
		handler.commit_stock(&order.id).await.unwrap();
		assert_eq!(stock_of(&storage, "p-1").await, 2);

		let err = handler
			.edit_line_item(&order.id, 0, 8, &staff())
			.await
			.unwrap_err();
		assert!(matches!(err, LifecycleError::InsufficientStock { .. }));

		assert_eq!(stock_of(&storage, "p-1").await, 2);
		let stored: Order = storage
			.retrieve(StorageKey::Orders.as_str(), &order.id)
			.await
			.unwrap();
		assert_eq!(stored.line_items[0].quantity, 3);
	}

	#[tokio::test]
	async fn delete_returns_committed_stock() {
		let order = order_with(vec![
			product("p-1", 10).snapshot(3),
			product("p-2", 10).snapshot(2),
		]);
		let (storage, handler) = setup(vec![product("p-1", 10), product("p-2", 10)], &order).await;
		handler.commit_stock(&order.id).await.unwrap();
		assert_eq!(stock_of(&storage, "p-2").await, 8);

		let updated = handler
			.delete_line_item(&order.id, 1, &staff())
			.await
			.unwrap();
		assert_eq!(updated.line_items.len(), 1);
		assert_eq!(stock_of(&storage, "p-2").await, 10);
		assert_eq!(stock_of(&storage, "p-1").await, 7);
	}

	#[tokio::test]
	async fn line_item_edits_validate_inputs_and_role() {
		let order = order_with(vec![product("p-1", 10).snapshot(3)]);
		let (_storage, handler) = setup(vec![product("p-1", 10)], &order).await;

		assert!(matches!(
			handler.edit_line_item(&order.id, 0, 0, &staff()).await,
			Err(LifecycleError::Validation(_))
		));
		assert!(matches!(
			handler.edit_line_item(&order.id, 4, 2, &staff()).await,
			Err(LifecycleError::Validation(_))
		));

		let subscriber = ActorContext {
			id: "acct-sub".to_string(),
			email: "sub@example.com".to_string(),
			role: Role::Subscriber,
		};
		assert!(matches!(
			handler.edit_line_item(&order.id, 0, 2, &subscriber).await,
			Err(LifecycleError::Forbidden(_))
		));
		assert!(matches!(
			handler.delete_line_item(&order.id, 0, &subscriber).await,
			Err(LifecycleError::Forbidden(_))
		));
	}

	#[tokio::test]
	async fn missing_order_maps_to_not_found() {
		let order = order_with(vec![product("p-1", 10).snapshot(3)]);
		let (_storage, handler) = setup(vec![product("p-1", 10)], &order).await;

		assert!(matches!(
			handler.commit_stock("ord-missing").await,
			Err(LifecycleError::NotFound(_))
		));
	}
}
