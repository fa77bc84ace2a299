//! HTTP mail-API delivery backend.
//!
//! Posts each message as JSON to a transactional mail provider endpoint,
//! authenticated with a bearer API key. Any non-success response is surfaced
//! as `NotifyError::Rejected` so the outbox worker retries it.

use crate::{NotifierInterface, NotifyError};
use async_trait::async_trait;
use portal_types::{
	ConfigSchema, EmailMessage, Field, FieldType, Schema, SecretString, ValidationError,
};
use std::time::Duration;

/// Notifier implementation backed by an HTTP mail API.
pub struct HttpNotifier {
	/// HTTP client with the configured request timeout.
	client: reqwest::Client,
	/// Mail provider endpoint accepting JSON message posts.
	endpoint: String,
	/// Bearer API key for the provider.
	api_key: Option<SecretString>,
}

impl HttpNotifier {
	/// Creates a new HttpNotifier for the given endpoint.
	pub fn new(
		endpoint: String,
		api_key: Option<SecretString>,
		timeout: Duration,
	) -> Result<Self, NotifyError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| NotifyError::Configuration(e.to_string()))?;

		Ok(Self {
			client,
			endpoint,
			api_key,
		})
	}
}

#[async_trait]
impl NotifierInterface for HttpNotifier {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpNotifierSchema)
	}

	async fn send(&self, from: &str, message: &EmailMessage) -> Result<(), NotifyError> {
		let mut request = self.client.post(&self.endpoint).json(&serde_json::json!({
			"from": from,
			"to": message.to,
			"subject": message.subject,
			"text": message.body,
		}));

		if let Some(key) = &self.api_key {
			request = request.bearer_auth(key.expose_secret());
		}

		let response = request
			.send()
			.await
			.map_err(|e| NotifyError::Network(e.to_string()))?;

		if response.status().is_success() {
			tracing::debug!(
				template = %message.template,
				to = %message.to,
				"Mail accepted by provider"
			);
			Ok(())
		} else {
			let status = response.status();
			let body = response.text().await.unwrap_or_default();
			Err(NotifyError::Rejected(format!("{}: {}", status, body)))
		}
	}
}

/// Configuration schema for HttpNotifier.
pub struct HttpNotifierSchema;

impl ConfigSchema for HttpNotifierSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![Field::new("endpoint", FieldType::String).with_validator(|value| {
				let url = value.as_str().unwrap_or_default();
				if url.starts_with("http://") || url.starts_with("https://") {
					Ok(())
				} else {
					Err("Endpoint must be an http(s) URL".to_string())
				}
			})],
			vec![
				Field::new("api_key", FieldType::String),
				Field::new(
					"timeout_seconds",
					FieldType::Integer {
						min: Some(1),
						max: Some(300),
					},
				),
			],
		)
		.validate(config)
	}
}

/// Registry for the HTTP notifier implementation.
pub struct Registry;

impl portal_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "http";
	type Factory = crate::NotifierFactory;

	fn factory() -> Self::Factory {
		create_notifier
	}
}

impl crate::NotifierRegistry for Registry {}

/// Factory function to create an HTTP notifier from configuration.
///
/// Configuration parameters:
/// - `endpoint`: Mail provider URL (required)
/// - `api_key`: Bearer API key (optional)
/// - `timeout_seconds`: Request timeout (default: 30)
pub fn create_notifier(config: &toml::Value) -> Result<Box<dyn NotifierInterface>, NotifyError> {
	let endpoint = config
		.get("endpoint")
		.and_then(|v| v.as_str())
		.ok_or_else(|| NotifyError::Configuration("Missing 'endpoint'".into()))?
		.to_string();

	let api_key = config
		.get("api_key")
		.and_then(|v| v.as_str())
		.map(|s| SecretString::new(s.to_string()));

	let timeout = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64)
		.unwrap_or(30);

	Ok(Box::new(HttpNotifier::new(
		endpoint,
		api_key,
		Duration::from_secs(timeout),
	)?))
}
