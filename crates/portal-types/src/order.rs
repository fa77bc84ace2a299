//! Order types for the portal system.
//!
//! This module defines the central order entity together with the embedded
//! line-item snapshots, shipping and opportunity data, and the fulfillment
//! fields populated after approval.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a demo-kit order throughout its lifecycle.
///
/// An order is created from a checkout cart and carries everything needed
/// for approval, dispatch, and return tracking. Line items are snapshots
/// taken at creation time; later catalog edits never alter stored orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
	/// Unique identifier for this order.
	pub id: String,
	/// Human-facing sequential order number.
	pub order_number: u64,
	/// Current status of the order.
	pub status: OrderStatus,
	/// Unix timestamp when this order was created. Immutable.
	pub created_at: u64,
	/// Unix timestamp when this order was last updated.
	pub updated_at: u64,
	/// Number of demo units requested.
	pub units: u32,
	/// Per-unit budget.
	pub budget: f64,
	/// Computed revenue, always `units * budget` after any edit.
	pub revenue: f64,
	/// CRM account identifier.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub account_id: Option<String>,
	/// CRM quote identifier.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub quote_id: Option<String>,
	/// Market segment for this opportunity.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub segment: Option<String>,
	/// Device manufacturer.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub manufacturer: Option<String>,
	/// Whether the order was placed through a reseller.
	#[serde(default)]
	pub reseller: bool,
	/// Customer and shipping details.
	pub shipping: ShippingInfo,
	/// Carrier and return tracking details, populated after approval.
	#[serde(default)]
	pub fulfillment: FulfillmentInfo,
	/// Line-item snapshots copied from the cart at creation time.
	pub line_items: Vec<LineItem>,
	/// Identity of the actor who approved the order. Set exactly once.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub approved_by: Option<String>,
	/// Unix timestamp of the pending -> approved transition. Set exactly once.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub approved_at: Option<u64>,
	/// Whether stock has been committed for this order's line items.
	#[serde(default)]
	pub stock_committed: bool,
	/// Demo loan state for the expiry sweep.
	pub demo_status: DemoStatus,
	/// Date the demo loan expires.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub demo_expiry_date: Option<NaiveDate>,
	/// Unix timestamp when the kit was returned, if it has been.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub returned_at: Option<u64>,
}

impl Order {
	/// Recomputes revenue from the current units and budget.
	pub fn recompute_revenue(&mut self) {
		self.revenue = f64::from(self.units) * self.budget;
	}
}

/// A product snapshot embedded in an order at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
	/// Catalog product this snapshot was taken from.
	pub product_id: String,
	/// Product name at creation time.
	pub name: String,
	/// SKU at creation time.
	pub sku: String,
	/// Brand at creation time.
	pub brand: String,
	/// Processor description at creation time.
	pub processor: String,
	/// Memory description at creation time.
	pub memory: String,
	/// Number of units of this product in the order.
	pub quantity: u32,
}

/// Customer and shipping details captured at checkout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShippingInfo {
	pub company: String,
	pub contact_name: String,
	pub contact_email: String,
	pub address: String,
	pub city: String,
	pub state: String,
	pub zip: String,
	/// Requested delivery date, if the customer picked one.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub requested_delivery: Option<NaiveDate>,
}

/// Carrier and return tracking details, populated after approval.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FulfillmentInfo {
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
	/// File reference for an uploaded return label.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub return_label: Option<String>,
}

/// Status of an order in the portal system.
///
/// The nominal workflow is pending -> approved | rejected, then
/// approved -> shipped -> return | shipped_extension. Admin and shop
/// manager roles may override this graph; see the transition policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	/// Order has been created and awaits a decision.
	Pending,
	/// Order was approved by a program manager or admin.
	Approved,
	/// Order was rejected. Terminal in the nominal workflow.
	Rejected,
	/// Demo kit has been dispatched to the customer.
	Shipped,
	/// Demo kit is on its way back.
	Return,
	/// Demo loan period was extended while shipped.
	ShippedExtension,
}

impl OrderStatus {
	/// Returns every status in the closed enumeration.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Pending,
			Self::Approved,
			Self::Rejected,
			Self::Shipped,
			Self::Return,
			Self::ShippedExtension,
		]
		.into_iter()
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OrderStatus::Pending => write!(f, "pending"),
			OrderStatus::Approved => write!(f, "approved"),
			OrderStatus::Rejected => write!(f, "rejected"),
			OrderStatus::Shipped => write!(f, "shipped"),
			OrderStatus::Return => write!(f, "return"),
			OrderStatus::ShippedExtension => write!(f, "shipped_extension"),
		}
	}
}

/// Demo loan state used by the expiry sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemoStatus {
	/// Loan is active; the kit is with the customer.
	Active,
	/// Loan has passed its expiry date without a return.
	Expired,
}

impl fmt::Display for DemoStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DemoStatus::Active => write!(f, "active"),
			DemoStatus::Expired => write!(f, "expired"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_round_trips_through_snake_case() {
		for status in OrderStatus::all() {
			let json = serde_json::to_string(&status).unwrap();
			let back: OrderStatus = serde_json::from_str(&json).unwrap();
			assert_eq!(status, back);
		}
		assert_eq!(
			serde_json::to_string(&OrderStatus::ShippedExtension).unwrap(),
			"\"shipped_extension\""
		);
	}

	#[test]
	fn revenue_tracks_units_and_budget() {
		let mut order = Order {
			id: "o1".into(),
			order_number: 1,
			status: OrderStatus::Pending,
			created_at: 0,
			updated_at: 0,
			units: 4,
			budget: 250.0,
			revenue: 0.0,
			account_id: None,
			quote_id: None,
			segment: None,
			manufacturer: None,
			reseller: false,
			shipping: ShippingInfo::default(),
			fulfillment: FulfillmentInfo::default(),
			line_items: vec![],
			approved_by: None,
			approved_at: None,
			stock_committed: false,
			demo_status: DemoStatus::Active,
			demo_expiry_date: None,
			returned_at: None,
		};
		order.recompute_revenue();
		assert_eq!(order.revenue, 1000.0);
	}
}
