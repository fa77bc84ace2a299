//! API types for the portal HTTP API.
//!
//! This module defines the request and response types for the portal's
//! JSON endpoints, along with the structured error type mapped onto
//! conventional HTTP status codes.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{EmailTemplate, OrderStatus, ShippingInfo};

/// A cart line submitted at checkout, referencing a live catalog product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
	/// Catalog product to snapshot into the order.
	pub product_id: String,
	/// Requested quantity.
	pub quantity: u32,
}

/// Request body for POST /orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
	/// Cart lines to snapshot into the order.
	pub cart: Vec<CartLine>,
	/// Number of demo units.
	pub units: u32,
	/// Per-unit budget.
	pub budget: f64,
	/// Customer and shipping details.
	pub shipping: ShippingInfo,
	/// CRM opportunity details.
	#[serde(default)]
	pub opportunity: OpportunityInfo,
	/// Demo loan expiry date, if known at checkout.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub demo_expiry_date: Option<NaiveDate>,
}

/// CRM opportunity details captured at checkout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpportunityInfo {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub account_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub quote_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub segment: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub manufacturer: Option<String>,
	#[serde(default)]
	pub reseller: bool,
}

/// Response body for POST /orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderResponse {
	/// Generated order id.
	pub id: String,
	/// Human-facing sequential order number.
	pub order_number: u64,
}

/// Request body for PATCH /orders/{id}: a status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
	/// Target status from the closed enumeration.
	pub status: OrderStatus,
}

/// Request body for PUT /orders/{id}: a partial field edit.
///
/// Every field is optional; absent fields are left untouched. Changing
/// units or budget recomputes revenue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateOrderRequest {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub units: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub budget: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub shipping: Option<ShippingPatch>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub opportunity: Option<OpportunityPatch>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub fulfillment: Option<FulfillmentPatch>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub demo_expiry_date: Option<NaiveDate>,
}

/// Partial update of shipping fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShippingPatch {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub company: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub contact_name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub contact_email: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub address: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub city: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub state: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub zip: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub requested_delivery: Option<NaiveDate>,
}

/// Partial update of opportunity fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpportunityPatch {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub account_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub quote_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub segment: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub manufacturer: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reseller: Option<bool>,
}

/// Partial update of fulfillment fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FulfillmentPatch {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tracking_number: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tracking_link: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub return_tracking_number: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub return_tracking_link: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub case_type: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tracking_credentials: Option<String>,
}

/// Request body for PUT /orders/{id}/items/{index}.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditLineItemRequest {
	/// New quantity for the line item.
	pub quantity: u32,
}

/// Request body for PUT /orders/{id}/return-label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnLabelRequest {
	/// File reference for the uploaded label.
	pub file: String,
}

/// Request body for POST /send-email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEmailRequest {
	/// Template key to render.
	pub template: EmailTemplate,
	/// Recipient address.
	pub recipient: String,
	/// Template data blob.
	#[serde(default)]
	pub data: serde_json::Value,
}

/// API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code.
	pub error: String,
	/// Human-readable description.
	pub message: String,
}

/// Structured API error with HTTP status mapping.
#[derive(Debug)]
pub enum ApiError {
	/// Missing or malformed request fields (400).
	BadRequest { error_type: String, message: String },
	/// Missing or unknown credentials (401).
	Unauthorized { message: String },
	/// Caller's role does not permit the operation (403).
	Forbidden { message: String },
	/// Referenced order, product, or notification does not exist (404).
	NotFound { message: String },
	/// Record-store or downstream failure (500). Logged server-side; the
	/// caller only sees a generic message.
	InternalServerError { message: String },
}

impl ApiError {
	/// Returns the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			ApiError::BadRequest { .. } => 400,
			ApiError::Unauthorized { .. } => 401,
			ApiError::Forbidden { .. } => 403,
			ApiError::NotFound { .. } => 404,
			ApiError::InternalServerError { .. } => 500,
		}
	}

	/// Converts to an [`ErrorResponse`] for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		match self {
			ApiError::BadRequest {
				error_type,
				message,
			} => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
			},
			ApiError::Unauthorized { message } => ErrorResponse {
				error: "UNAUTHORIZED".to_string(),
				message: message.clone(),
			},
			ApiError::Forbidden { message } => ErrorResponse {
				error: "FORBIDDEN".to_string(),
				message: message.clone(),
			},
			ApiError::NotFound { message } => ErrorResponse {
				error: "NOT_FOUND".to_string(),
				message: message.clone(),
			},
			ApiError::InternalServerError { .. } => ErrorResponse {
				error: "INTERNAL_ERROR".to_string(),
				message: "Internal server error".to_string(),
			},
		}
	}
}

impl fmt::Display for ApiError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ApiError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			ApiError::Unauthorized { message } => write!(f, "Unauthorized: {}", message),
			ApiError::Forbidden { message } => write!(f, "Forbidden: {}", message),
			ApiError::NotFound { message } => write!(f, "Not Found: {}", message),
			ApiError::InternalServerError { message } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for ApiError {}

impl axum::response::IntoResponse for ApiError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = StatusCode::from_u16(self.status_code())
			.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		let error_response = self.to_error_response();
		(status, Json(error_response)).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn internal_errors_stay_generic() {
		let err = ApiError::InternalServerError {
			message: "record store timed out on shard 3".to_string(),
		};
		let body = err.to_error_response();
		assert_eq!(body.error, "INTERNAL_ERROR");
		assert!(!body.message.contains("shard"));
	}

	#[test]
	fn status_codes_follow_taxonomy() {
		assert_eq!(
			ApiError::BadRequest {
				error_type: "VALIDATION".into(),
				message: String::new()
			}
			.status_code(),
			400
		);
		assert_eq!(
			ApiError::Forbidden {
				message: String::new()
			}
			.status_code(),
			403
		);
		assert_eq!(
			ApiError::NotFound {
				message: String::new()
			}
			.status_code(),
			404
		);
	}
}
