//! Product catalog types.

use serde::{Deserialize, Serialize};

use crate::LineItem;

/// A catalog product with a mutable stock count.
///
/// Stock is only ever adjusted through storage compare-and-swap so that
/// concurrent edits cannot lose updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
	/// Unique identifier for this product.
	pub id: String,
	pub name: String,
	pub sku: String,
	pub brand: String,
	pub processor: String,
	pub memory: String,
	/// Units currently available for demo kits.
	pub stock_quantity: u32,
}

impl Product {
	/// Takes a line-item snapshot of this product for embedding in an order.
	pub fn snapshot(&self, quantity: u32) -> LineItem {
		LineItem {
			product_id: self.id.clone(),
			name: self.name.clone(),
			sku: self.sku.clone(),
			brand: self.brand.clone(),
			processor: self.processor.clone(),
			memory: self.memory.clone(),
			quantity,
		}
	}
}
