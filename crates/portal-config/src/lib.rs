//! Configuration module for the demo portal system.
//!
//! This module provides structures and utilities for managing portal configuration.
//! It supports loading configuration from TOML files and provides validation to ensure
//! all required configuration values are properly set.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files for better organization:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

mod loader;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Main configuration structure for the demo portal.
///
/// This structure contains all configuration sections required for the portal
/// to operate, including portal identity, storage, account identity resolution,
/// notification delivery, the demo-expiry sweep, the outbox worker, and the
/// HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Configuration specific to this portal instance.
	pub portal: PortalConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// Configuration for identity resolution.
	pub identity: IdentityConfig,
	/// Configuration for notification delivery.
	pub notifications: NotificationsConfig,
	/// Configuration for the demo-expiry sweep.
	#[serde(default)]
	pub sweep: SweepConfig,
	/// Configuration for the notification outbox worker.
	#[serde(default)]
	pub outbox: OutboxConfig,
	/// Configuration for the HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Configuration specific to the portal instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PortalConfig {
	/// Unique identifier for this portal instance.
	pub id: String,
	/// Public base URL used to build links in outgoing mail.
	#[serde(default = "default_base_url")]
	pub base_url: String,
}

fn default_base_url() -> String {
	"http://localhost:3000".to_string()
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Interval in seconds for cleaning up expired storage entries.
	pub cleanup_interval_seconds: u64,
}

/// Configuration for identity resolution.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdentityConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of identity implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for notification delivery.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationsConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of notifier implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Mailbox that receives the admin copy of order mail.
	pub ops_mailbox: String,
	/// Sender address for outgoing mail.
	pub from_address: String,
}

/// Configuration for the demo-expiry sweep.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SweepConfig {
	/// How often the sweep runs, in seconds.
	#[serde(default = "default_sweep_interval")]
	pub interval_seconds: u64,
	/// Days before expiry at which the reminder goes out.
	#[serde(default = "default_reminder_days")]
	pub reminder_days_before: u32,
	/// Spacing in days between overdue escalations.
	#[serde(default = "default_overdue_step")]
	pub overdue_step_days: u32,
	/// Ceiling in days past expiry beyond which escalations stop.
	#[serde(default = "default_overdue_cap")]
	pub overdue_cap_days: u32,
}

impl Default for SweepConfig {
	fn default() -> Self {
		Self {
			interval_seconds: default_sweep_interval(),
			reminder_days_before: default_reminder_days(),
			overdue_step_days: default_overdue_step(),
			overdue_cap_days: default_overdue_cap(),
		}
	}
}

fn default_sweep_interval() -> u64 {
	3600 // Hourly
}

fn default_reminder_days() -> u32 {
	5
}

fn default_overdue_step() -> u32 {
	5
}

fn default_overdue_cap() -> u32 {
	20
}

/// Configuration for the notification outbox worker.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutboxConfig {
	/// How often the outbox drains, in seconds.
	#[serde(default = "default_outbox_interval")]
	pub interval_seconds: u64,
	/// Delivery attempts per record before it is parked.
	#[serde(default = "default_outbox_attempts")]
	pub max_attempts: u32,
}

impl Default for OutboxConfig {
	fn default() -> Self {
		Self {
			interval_seconds: default_outbox_interval(),
			max_attempts: default_outbox_attempts(),
		}
	}
}

fn default_outbox_interval() -> u64 {
	30
}

fn default_outbox_attempts() -> u32 {
	5
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	/// Maximum request size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
}

/// Returns the default API host.
fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

/// Returns the default API port.
fn default_api_port() -> u16 {
	3000
}

/// Returns the default API timeout in seconds.
fn default_api_timeout() -> u64 {
	30
}

/// Returns the default maximum request size in bytes.
fn default_max_request_size() -> usize {
	1024 * 1024 // 1MB
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	// Limit input size to prevent ReDoS attacks
	const MAX_INPUT_SIZE: usize = 1024 * 1024; // 1MB
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let full_match = cap.get(0).unwrap();
		let var_name = cap.get(1).unwrap().as_str();
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name) {
			Ok(v) => v,
			Err(_) => {
				if let Some(default) = default_value {
					default.to_string()
				} else {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name
					)));
				}
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a file with async environment variable resolution.
	///
	/// This method supports modular configuration through include directives:
	/// - `include = ["file1.toml", "file2.toml"]` - Include specific files
	///
	/// Each top-level section must be unique across all configuration files.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Validates the configuration to ensure all required fields are properly set.
	///
	/// This method performs validation across all configuration sections:
	/// - Ensures portal ID is not empty
	/// - Validates storage backend is specified and primary exists
	/// - Verifies identity and notifier primaries resolve to implementations
	/// - Checks notification addresses and sweep/outbox bounds
	fn validate(&self) -> Result<(), ConfigError> {
		// Validate portal config
		if self.portal.id.is_empty() {
			return Err(ConfigError::Validation("Portal ID cannot be empty".into()));
		}

		// Validate storage config
		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if self.storage.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Storage primary implementation cannot be empty".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}
		if self.storage.cleanup_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds must be greater than 0".into(),
			));
		}
		if self.storage.cleanup_interval_seconds > 86400 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds cannot exceed 86400 (24 hours)".into(),
			));
		}

		// Validate identity config
		if self.identity.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one identity implementation required".into(),
			));
		}
		if !self
			.identity
			.implementations
			.contains_key(&self.identity.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary identity '{}' not found in implementations",
				self.identity.primary
			)));
		}

		// Validate notifications config
		if self.notifications.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one notifier implementation required".into(),
			));
		}
		if !self
			.notifications
			.implementations
			.contains_key(&self.notifications.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary notifier '{}' not found in implementations",
				self.notifications.primary
			)));
		}
		if !self.notifications.ops_mailbox.contains('@') {
			return Err(ConfigError::Validation(
				"notifications.ops_mailbox must be an email address".into(),
			));
		}
		if !self.notifications.from_address.contains('@') {
			return Err(ConfigError::Validation(
				"notifications.from_address must be an email address".into(),
			));
		}

		// Validate sweep config
		if self.sweep.interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"sweep.interval_seconds must be greater than 0".into(),
			));
		}
		if self.sweep.overdue_step_days == 0 {
			return Err(ConfigError::Validation(
				"sweep.overdue_step_days must be greater than 0".into(),
			));
		}
		if self.sweep.overdue_cap_days < self.sweep.overdue_step_days {
			return Err(ConfigError::Validation(
				"sweep.overdue_cap_days cannot be below overdue_step_days".into(),
			));
		}

		// Validate outbox config
		if self.outbox.interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"outbox.interval_seconds must be greater than 0".into(),
			));
		}
		if self.outbox.max_attempts == 0 {
			return Err(ConfigError::Validation(
				"outbox.max_attempts must be greater than 0".into(),
			));
		}

		Ok(())
	}
}

/// Implementation of FromStr trait for Config to enable parsing from string.
///
/// This allows configuration to be parsed from TOML strings using the standard
/// string parsing interface. Environment variables are resolved and the
/// configuration is automatically validated after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const VALID_CONFIG: &str = r#"
[portal]
id = "demo-portal"

[storage]
primary = "memory"
cleanup_interval_seconds = 3600
[storage.implementations.memory]

[identity]
primary = "static"
[identity.implementations.static]

[notifications]
primary = "log"
ops_mailbox = "orders@example.com"
from_address = "portal@example.com"
[notifications.implementations.log]
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("TEST_MAIL_HOST", "mail.example.com");
		std::env::set_var("TEST_MAIL_PORT", "2525");

		let input = "endpoint = \"${TEST_MAIL_HOST}:${TEST_MAIL_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "endpoint = \"mail.example.com:2525\"");

		std::env::remove_var("TEST_MAIL_HOST");
		std::env::remove_var("TEST_MAIL_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("MISSING_VAR"));
	}

	#[test]
	fn test_valid_config_parses_with_defaults() {
		let config: Config = VALID_CONFIG.parse().unwrap();
		assert_eq!(config.portal.id, "demo-portal");
		assert_eq!(config.sweep.reminder_days_before, 5);
		assert_eq!(config.sweep.overdue_step_days, 5);
		assert_eq!(config.sweep.overdue_cap_days, 20);
		assert_eq!(config.outbox.max_attempts, 5);
		assert!(config.api.is_none());
	}

	#[test]
	fn test_unknown_primary_rejected() {
		let config_str = VALID_CONFIG.replace("primary = \"static\"", "primary = \"ldap\"");
		let result = Config::from_str(&config_str);
		assert!(result.is_err());
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("Primary identity 'ldap' not found"));
	}

	#[test]
	fn test_ops_mailbox_must_be_address() {
		let config_str =
			VALID_CONFIG.replace("ops_mailbox = \"orders@example.com\"", "ops_mailbox = \"ops\"");
		let result = Config::from_str(&config_str);
		assert!(result.is_err());
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("ops_mailbox must be an email address"));
	}

	#[test]
	fn test_overdue_cap_below_step_rejected() {
		let config_str = format!(
			"{}\n[sweep]\noverdue_step_days = 10\noverdue_cap_days = 5\n",
			VALID_CONFIG
		);
		let result = Config::from_str(&config_str);
		assert!(result.is_err());
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("overdue_cap_days cannot be below"));
	}
}
