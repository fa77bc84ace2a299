//! Notification delivery module for the demo portal system.
//!
//! This module handles outbound email. It provides abstractions for different
//! delivery backends (an HTTP mail API for production, a log backend for
//! development) and the template rendering used to turn outbox records into
//! messages. The outbox worker in the core crate drives delivery; nothing
//! here persists state.

pub mod templates;

use async_trait::async_trait;
use portal_types::{ConfigSchema, EmailMessage, EmailTemplate, ImplementationRegistry};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod http;
	pub mod log;
}

/// Errors that can occur during notification delivery.
#[derive(Debug, Error)]
pub enum NotifyError {
	/// Error that occurs during network communication.
	#[error("Network error: {0}")]
	Network(String),
	/// The mail provider accepted the connection but refused the message.
	#[error("Message rejected: {0}")]
	Rejected(String),
	/// Error that occurs when the notifier configuration is invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for notification delivery backends.
///
/// This trait must be implemented by any mail backend that wants to integrate
/// with the portal. A send that returns `Ok` means the provider accepted the
/// message; the outbox worker retries anything else.
#[async_trait]
pub trait NotifierInterface: Send + Sync {
	/// Returns the configuration schema for this notifier implementation.
	///
	/// This allows each implementation to define its own configuration requirements
	/// with specific validation rules. The schema is used to validate TOML configuration
	/// before initializing the notifier.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Delivers a single rendered message from the given sender address.
	async fn send(&self, from: &str, message: &EmailMessage) -> Result<(), NotifyError>;
}

/// Type alias for notifier factory functions.
pub type NotifierFactory = fn(&toml::Value) -> Result<Box<dyn NotifierInterface>, NotifyError>;

/// Registry trait for notifier implementations.
pub trait NotifierRegistry: ImplementationRegistry<Factory = NotifierFactory> {}

/// Get all registered notifier implementations.
pub fn get_all_implementations() -> Vec<(&'static str, NotifierFactory)> {
	use implementations::{http, log};

	vec![
		(http::Registry::NAME, http::Registry::factory()),
		(log::Registry::NAME, log::Registry::factory()),
	]
}

/// Service that manages notification delivery.
///
/// Wraps a delivery backend with the portal's sender address and the
/// template rendering that turns payloads into messages.
pub struct NotifierService {
	/// The underlying delivery backend.
	implementation: Box<dyn NotifierInterface>,
	/// Sender address for outgoing mail.
	from_address: String,
}

impl NotifierService {
	/// Creates a new NotifierService with the specified backend and sender.
	pub fn new(implementation: Box<dyn NotifierInterface>, from_address: String) -> Self {
		Self {
			implementation,
			from_address,
		}
	}

	/// Renders a template against its payload and delivers the result.
	pub async fn send(
		&self,
		template: EmailTemplate,
		recipient: &str,
		payload: &serde_json::Value,
	) -> Result<(), NotifyError> {
		let message = templates::render(template, recipient, payload);
		self.implementation.send(&self.from_address, &message).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::{Arc, Mutex};

	struct RecordingNotifier {
		sent: Arc<Mutex<Vec<(String, EmailMessage)>>>,
	}

	#[async_trait]
	impl NotifierInterface for RecordingNotifier {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			unimplemented!("not exercised in tests")
		}

		async fn send(&self, from: &str, message: &EmailMessage) -> Result<(), NotifyError> {
			self.sent
				.lock()
				.unwrap()
				.push((from.to_string(), message.clone()));
			Ok(())
		}
	}

	#[tokio::test]
	async fn send_renders_and_uses_from_address() {
		let sent = Arc::new(Mutex::new(Vec::new()));
		let service = NotifierService::new(
			Box::new(RecordingNotifier { sent: sent.clone() }),
			"portal@example.com".to_string(),
		);

		let payload = serde_json::json!({ "order_number": 42 });
		service
			.send(EmailTemplate::OrderApprovedUser, "buyer@example.com", &payload)
			.await
			.unwrap();

		let sent = sent.lock().unwrap();
		assert_eq!(sent.len(), 1);
		assert_eq!(sent[0].0, "portal@example.com");
		assert_eq!(sent[0].1.to, "buyer@example.com");
		assert!(sent[0].1.subject.contains("42"));
	}
}
