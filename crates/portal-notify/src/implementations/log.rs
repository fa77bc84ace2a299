//! Log-only delivery backend.
//!
//! Writes each message to the tracing log instead of sending it. Used in
//! development and in tests of everything upstream of actual delivery.

use crate::{NotifierInterface, NotifyError};
use async_trait::async_trait;
use portal_types::{ConfigSchema, EmailMessage, Schema, ValidationError};

/// Notifier implementation that logs messages instead of sending them.
pub struct LogNotifier;

#[async_trait]
impl NotifierInterface for LogNotifier {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LogNotifierSchema)
	}

	async fn send(&self, from: &str, message: &EmailMessage) -> Result<(), NotifyError> {
		tracing::info!(
			template = %message.template,
			from = %from,
			to = %message.to,
			subject = %message.subject,
			"Email (log backend, not sent)"
		);
		Ok(())
	}
}

/// Configuration schema for LogNotifier. Accepts an empty table.
pub struct LogNotifierSchema;

impl ConfigSchema for LogNotifierSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Registry for the log notifier implementation.
pub struct Registry;

impl portal_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "log";
	type Factory = crate::NotifierFactory;

	fn factory() -> Self::Factory {
		create_notifier
	}
}

impl crate::NotifierRegistry for Registry {}

/// Factory function to create a log notifier. Takes no configuration.
pub fn create_notifier(_config: &toml::Value) -> Result<Box<dyn NotifierInterface>, NotifyError> {
	Ok(Box::new(LogNotifier))
}

#[cfg(test)]
mod tests {
	use super::*;
	use portal_types::EmailTemplate;

	#[tokio::test]
	async fn send_always_succeeds() {
		let notifier = create_notifier(&toml::Value::Table(Default::default())).unwrap();
		let message = EmailMessage {
			to: "buyer@example.com".to_string(),
			subject: "Test".to_string(),
			body: "Body".to_string(),
			template: EmailTemplate::OrderApprovedUser,
		};
		assert!(notifier.send("portal@example.com", &message).await.is_ok());
	}
}
