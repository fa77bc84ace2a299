//! Email template rendering.
//!
//! Templates are rendered from the payload captured when the outbox record
//! was appended, so a resend after a crash produces the same text even if the
//! order has moved on since.

use portal_types::{EmailMessage, EmailTemplate};

fn payload_str<'a>(payload: &'a serde_json::Value, key: &str) -> &'a str {
	payload.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

fn payload_u64(payload: &serde_json::Value, key: &str) -> u64 {
	payload.get(key).and_then(|v| v.as_u64()).unwrap_or(0)
}

/// Renders a template against its payload into a deliverable message.
///
/// Payload keys in use: `order_number`, `name`, `email`, `tracking_number`,
/// `demo_expiry_date`, `days_overdue`.
pub fn render(
	template: EmailTemplate,
	recipient: &str,
	payload: &serde_json::Value,
) -> EmailMessage {
	let order_number = payload_u64(payload, "order_number");
	let name = payload_str(payload, "name");

	let (subject, body) = match template {
		EmailTemplate::OrderApprovedUser => (
			format!("Your demo kit order #{} has been approved", order_number),
			format!(
				"Hello {},\n\nYour demo kit order #{} has been approved and is \
				being prepared for shipment.\n",
				name, order_number
			),
		),
		EmailTemplate::OrderApprovedAdmin => (
			format!("Order #{} approved", order_number),
			format!(
				"Order #{} for {} ({}) was approved.\n",
				order_number,
				name,
				payload_str(payload, "email")
			),
		),
		EmailTemplate::OrderRejectedUser => (
			format!("Your demo kit order #{} was not approved", order_number),
			format!(
				"Hello {},\n\nYour demo kit order #{} could not be approved. \
				Please contact your program manager for details.\n",
				name, order_number
			),
		),
		EmailTemplate::OrderRejectedAdmin => (
			format!("Order #{} rejected", order_number),
			format!(
				"Order #{} for {} ({}) was rejected.\n",
				order_number,
				name,
				payload_str(payload, "email")
			),
		),
		EmailTemplate::OrderShippedUser => (
			format!("Your demo kit order #{} has shipped", order_number),
			format!(
				"Hello {},\n\nYour demo kit order #{} is on its way. \
				Tracking number: {}.\n",
				name,
				order_number,
				payload_str(payload, "tracking_number")
			),
		),
		EmailTemplate::OrderShippedAdmin => (
			format!("Order #{} shipped", order_number),
			format!(
				"Order #{} for {} ({}) has shipped.\n",
				order_number,
				name,
				payload_str(payload, "email")
			),
		),
		EmailTemplate::OrderReturnUser => (
			format!("Return confirmed for demo kit order #{}", order_number),
			format!(
				"Hello {},\n\nThe return of your demo kit order #{} has been \
				recorded. Thank you.\n",
				name, order_number
			),
		),
		EmailTemplate::OrderReturnAdmin => (
			format!("Order #{} returned", order_number),
			format!(
				"Order #{} for {} ({}) was marked as returned.\n",
				order_number,
				name,
				payload_str(payload, "email")
			),
		),
		EmailTemplate::DemoExpiryReminder => (
			format!("Demo period for order #{} ends soon", order_number),
			format!(
				"Hello {},\n\nThe demo period for order #{} ends on {}. \
				Please arrange the return of the kit.\n",
				name,
				order_number,
				payload_str(payload, "demo_expiry_date")
			),
		),
		EmailTemplate::DemoOverdue => (
			format!(
				"Demo kit order #{} is {} days overdue",
				order_number,
				payload_u64(payload, "days_overdue")
			),
			format!(
				"Order #{} for {} ({}) passed its demo expiry on {} and has \
				not been returned.\n",
				order_number,
				name,
				payload_str(payload, "email"),
				payload_str(payload, "demo_expiry_date")
			),
		),
	};

	EmailMessage {
		to: recipient.to_string(),
		subject,
		body,
		template,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn shipped_mail_carries_tracking_number() {
		let payload = serde_json::json!({
			"order_number": 17,
			"name": "Dana",
			"tracking_number": "1Z999"
		});
		let message = render(EmailTemplate::OrderShippedUser, "dana@example.com", &payload);
		assert_eq!(message.to, "dana@example.com");
		assert!(message.subject.contains("#17"));
		assert!(message.body.contains("1Z999"));
	}

	#[test]
	fn overdue_mail_names_days_and_date() {
		let payload = serde_json::json!({
			"order_number": 9,
			"name": "Sam",
			"email": "sam@example.com",
			"demo_expiry_date": "2025-06-01",
			"days_overdue": 10
		});
		let message = render(EmailTemplate::DemoOverdue, "orders@example.com", &payload);
		assert!(message.subject.contains("10 days overdue"));
		assert!(message.body.contains("2025-06-01"));
	}

	#[test]
	fn missing_payload_keys_render_empty() {
		let message = render(
			EmailTemplate::OrderApprovedUser,
			"x@example.com",
			&serde_json::json!({}),
		);
		assert!(message.subject.contains("#0"));
	}
}
