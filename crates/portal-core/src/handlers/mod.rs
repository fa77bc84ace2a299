//! Handlers for the portal's order operations.
//!
//! Contains the order lifecycle handler (creation, transitions, field edits)
//! and the stock handler (commitment and line-item adjustments), plus the
//! error taxonomy every operation maps into.

pub mod order;
pub mod stock;

pub use order::OrderHandler;
pub use stock::StockHandler;

use portal_storage::StorageError;
use portal_types::ApiError;
use thiserror::Error;

/// Errors produced by order lifecycle and stock operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
	/// Missing or malformed request fields.
	#[error("Validation error: {0}")]
	Validation(String),
	/// The actor's role does not permit the operation.
	#[error("Forbidden: {0}")]
	Forbidden(String),
	/// A referenced order, product, or notification does not exist.
	#[error("Not found: {0}")]
	NotFound(String),
	/// A line-item quantity exceeds the product's available stock.
	#[error("Insufficient stock for product {product_id}: {available} available, {requested} requested")]
	InsufficientStock {
		product_id: String,
		available: u32,
		requested: u32,
	},
	/// The record store failed; the prior state is intact.
	#[error("Persistence error: {0}")]
	Persistence(String),
}

impl From<StorageError> for LifecycleError {
	fn from(e: StorageError) -> Self {
		match e {
			StorageError::NotFound => LifecycleError::NotFound("Record not found".to_string()),
			other => LifecycleError::Persistence(other.to_string()),
		}
	}
}

impl From<crate::state::OrderStateError> for LifecycleError {
	fn from(e: crate::state::OrderStateError) -> Self {
		use crate::state::OrderStateError;
		match e {
			OrderStateError::OrderNotFound(id) => {
				LifecycleError::NotFound(format!("Order not found: {}", id))
			},
			OrderStateError::Storage(msg) => LifecycleError::Persistence(msg),
		}
	}
}

impl From<LifecycleError> for ApiError {
	fn from(e: LifecycleError) -> Self {
		match e {
			LifecycleError::Validation(message) => ApiError::BadRequest {
				error_type: "VALIDATION".to_string(),
				message,
			},
			LifecycleError::Forbidden(message) => ApiError::Forbidden { message },
			LifecycleError::NotFound(message) => ApiError::NotFound { message },
			e @ LifecycleError::InsufficientStock { .. } => ApiError::BadRequest {
				error_type: "INSUFFICIENT_STOCK".to_string(),
				message: e.to_string(),
			},
			LifecycleError::Persistence(message) => ApiError::InternalServerError { message },
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn errors_map_to_api_taxonomy() {
		let api: ApiError = LifecycleError::InsufficientStock {
			product_id: "p-1".into(),
			available: 2,
			requested: 5,
		}
		.into();
		assert_eq!(api.status_code(), 400);
		assert!(api.to_error_response().message.contains("p-1"));

		let api: ApiError = LifecycleError::Forbidden("role".into()).into();
		assert_eq!(api.status_code(), 403);

		let api: ApiError = LifecycleError::Persistence("disk".into()).into();
		assert_eq!(api.status_code(), 500);
	}
}
