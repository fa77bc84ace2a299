//! Notification, email template, and outbox types.
//!
//! Status transitions and the demo-expiry sweep never send email inline.
//! They append an [`OutboxRecord`] next to the state change and let the
//! outbox worker deliver it at-least-once, keyed for deduplication.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::OrderStatus;

/// Feed record backing the unread-notification counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
	/// Unique identifier for this notification.
	pub id: String,
	/// Whether this notification concerns a user or an order.
	pub kind: NotificationKind,
	/// Event name, e.g. "order_approved".
	pub event: String,
	/// Id of the order or profile the event refers to.
	pub reference_id: String,
	/// Whether the notification has been read in the UI feed.
	#[serde(default)]
	pub is_read: bool,
	/// Unix timestamp when the notification was created.
	pub created_at: u64,
}

/// Category of a feed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
	User,
	Order,
}

/// Email template keys understood by the notifier.
///
/// Order-status templates are a pure function of the new status; see
/// [`EmailTemplate::for_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailTemplate {
	OrderApprovedUser,
	OrderApprovedAdmin,
	OrderRejectedUser,
	OrderRejectedAdmin,
	OrderShippedUser,
	OrderShippedAdmin,
	OrderReturnUser,
	OrderReturnAdmin,
	DemoExpiryReminder,
	DemoOverdue,
}

impl EmailTemplate {
	/// Returns the (customer, operations) template pair for a status, or
	/// `None` when the status triggers no email.
	pub fn for_status(status: OrderStatus) -> Option<(Self, Self)> {
		match status {
			OrderStatus::Approved => Some((Self::OrderApprovedUser, Self::OrderApprovedAdmin)),
			OrderStatus::Rejected => Some((Self::OrderRejectedUser, Self::OrderRejectedAdmin)),
			OrderStatus::Shipped => Some((Self::OrderShippedUser, Self::OrderShippedAdmin)),
			OrderStatus::Return => Some((Self::OrderReturnUser, Self::OrderReturnAdmin)),
			OrderStatus::Pending | OrderStatus::ShippedExtension => None,
		}
	}
}

impl fmt::Display for EmailTemplate {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let key = match self {
			EmailTemplate::OrderApprovedUser => "ORDER_APPROVED_USER",
			EmailTemplate::OrderApprovedAdmin => "ORDER_APPROVED_ADMIN",
			EmailTemplate::OrderRejectedUser => "ORDER_REJECTED_USER",
			EmailTemplate::OrderRejectedAdmin => "ORDER_REJECTED_ADMIN",
			EmailTemplate::OrderShippedUser => "ORDER_SHIPPED_USER",
			EmailTemplate::OrderShippedAdmin => "ORDER_SHIPPED_ADMIN",
			EmailTemplate::OrderReturnUser => "ORDER_RETURN_USER",
			EmailTemplate::OrderReturnAdmin => "ORDER_RETURN_ADMIN",
			EmailTemplate::DemoExpiryReminder => "DEMO_EXPIRY_REMINDER",
			EmailTemplate::DemoOverdue => "DEMO_OVERDUE",
		};
		write!(f, "{}", key)
	}
}

/// A rendered outbound email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
	/// Recipient address.
	pub to: String,
	/// Subject line.
	pub subject: String,
	/// Plain-text body.
	pub body: String,
	/// Template this message was rendered from.
	pub template: EmailTemplate,
}

/// A pending notification send, persisted alongside the state change that
/// produced it and delivered by the outbox worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxRecord {
	/// Unique identifier, also the storage id of this record.
	pub id: String,
	/// Order this send belongs to, if any.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub order_id: Option<String>,
	/// Template to render at delivery time.
	pub template: EmailTemplate,
	/// Recipient address.
	pub recipient: String,
	/// Deduplication key; repeated appends with the same key are dropped.
	pub dedupe_key: String,
	/// Template data captured at append time.
	pub payload: serde_json::Value,
	/// Delivery attempts made so far.
	#[serde(default)]
	pub attempts: u32,
	/// Unix timestamp when the record was appended.
	pub created_at: u64,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn templates_follow_status() {
		assert_eq!(
			EmailTemplate::for_status(OrderStatus::Approved),
			Some((
				EmailTemplate::OrderApprovedUser,
				EmailTemplate::OrderApprovedAdmin
			))
		);
		assert_eq!(EmailTemplate::for_status(OrderStatus::Pending), None);
		assert_eq!(
			EmailTemplate::for_status(OrderStatus::ShippedExtension),
			None
		);
	}

	#[test]
	fn template_keys_serialize_screaming() {
		let json = serde_json::to_string(&EmailTemplate::OrderApprovedUser).unwrap();
		assert_eq!(json, "\"ORDER_APPROVED_USER\"");
	}
}
