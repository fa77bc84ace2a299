//! Static token-table identity backend.
//!
//! Resolves bearer tokens against a table of accounts declared in the
//! configuration file. Suited to demos and small deployments where the
//! account set is fixed; tokens come from the config (with environment
//! variable substitution for the values themselves).

use crate::{IdentityError, IdentityInterface};
use async_trait::async_trait;
use portal_types::{
	ApprovalStatus, ConfigSchema, Field, FieldType, Profile, Role, Schema, ValidationError,
};
use std::collections::HashMap;

/// Identity implementation backed by an in-config account table.
pub struct StaticTableIdentity {
	/// Accounts keyed by their bearer token.
	accounts: HashMap<String, Profile>,
}

impl StaticTableIdentity {
	/// Creates a new StaticTableIdentity with the given token table.
	pub fn new(accounts: HashMap<String, Profile>) -> Self {
		Self { accounts }
	}
}

#[async_trait]
impl IdentityInterface for StaticTableIdentity {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(StaticTableSchema)
	}

	async fn resolve(&self, token: &str) -> Result<Profile, IdentityError> {
		self.accounts
			.get(token)
			.cloned()
			.ok_or(IdentityError::UnknownToken)
	}
}

/// Configuration schema for StaticTableIdentity.
pub struct StaticTableSchema;

impl ConfigSchema for StaticTableSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let account_schema = Schema::new(
			vec![
				Field::new("token", FieldType::String),
				Field::new("id", FieldType::String),
				Field::new("email", FieldType::String),
				Field::new("name", FieldType::String),
				Field::new("role", FieldType::String).with_validator(|value| {
					let role = value.as_str().unwrap_or_default();
					role.parse::<Role>()
						.map(|_| ())
						.map_err(|_| format!("Unknown role: {}", role))
				}),
			],
			vec![
				Field::new("approval", FieldType::String),
				Field::new("reseller", FieldType::String),
			],
		);

		Schema::new(
			vec![Field::new(
				"accounts",
				FieldType::Array(Box::new(FieldType::Table(account_schema))),
			)],
			vec![],
		)
		.validate(config)
	}
}

/// Registry for the static table identity implementation.
pub struct Registry;

impl portal_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "static";
	type Factory = crate::IdentityFactory;

	fn factory() -> Self::Factory {
		create_identity
	}
}

impl crate::IdentityRegistry for Registry {}

fn parse_approval(raw: Option<&str>) -> Result<ApprovalStatus, IdentityError> {
	match raw {
		None => Ok(ApprovalStatus::Approved),
		Some("pending") => Ok(ApprovalStatus::Pending),
		Some("approved") => Ok(ApprovalStatus::Approved),
		Some("rejected") => Ok(ApprovalStatus::Rejected),
		Some(other) => Err(IdentityError::Implementation(format!(
			"Unknown approval status: {}",
			other
		))),
	}
}

/// Factory function to create a static table identity backend from configuration.
///
/// Configuration parameters:
/// - `accounts`: Array of tables with `token`, `id`, `email`, `name`, `role`,
///   and optional `approval` (defaults to "approved") and `reseller` entries.
pub fn create_identity(
	config: &toml::Value,
) -> Result<Box<dyn IdentityInterface>, IdentityError> {
	let entries = config
		.get("accounts")
		.and_then(|v| v.as_array())
		.ok_or_else(|| IdentityError::Implementation("Missing 'accounts' array".into()))?;

	let mut accounts = HashMap::new();
	for entry in entries {
		let get_str = |key: &str| -> Result<String, IdentityError> {
			entry
				.get(key)
				.and_then(|v| v.as_str())
				.map(str::to_string)
				.ok_or_else(|| {
					IdentityError::Implementation(format!("Account missing '{}' field", key))
				})
		};

		let token = get_str("token")?;
		let role = get_str("role")?
			.parse::<Role>()
			.map_err(|_| IdentityError::Implementation("Unknown role in account table".into()))?;
		let approval = parse_approval(entry.get("approval").and_then(|v| v.as_str()))?;

		let profile = Profile {
			id: get_str("id")?,
			email: get_str("email")?,
			name: get_str("name")?,
			role,
			approval,
			reseller: entry
				.get("reseller")
				.and_then(|v| v.as_str())
				.map(str::to_string),
		};

		if accounts.insert(token, profile).is_some() {
			return Err(IdentityError::Implementation(
				"Duplicate token in account table".into(),
			));
		}
	}

	Ok(Box::new(StaticTableIdentity::new(accounts)))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_config() -> toml::Value {
		toml::from_str(
			r#"
[[accounts]]
token = "admin-token"
id = "acct-admin"
email = "admin@example.com"
name = "Portal Admin"
role = "admin"

[[accounts]]
token = "pm-token"
id = "acct-pm"
email = "pm@example.com"
name = "Program Manager"
role = "program_manager"
approval = "pending"
reseller = "Acme Resellers"
"#,
		)
		.unwrap()
	}

	#[tokio::test]
	async fn resolves_tokens_to_profiles() {
		let identity = create_identity(&sample_config()).unwrap();

		let admin = identity.resolve("admin-token").await.unwrap();
		assert_eq!(admin.role, Role::Admin);
		assert_eq!(admin.approval, ApprovalStatus::Approved);

		let pm = identity.resolve("pm-token").await.unwrap();
		assert_eq!(pm.approval, ApprovalStatus::Pending);
		assert_eq!(pm.reseller.as_deref(), Some("Acme Resellers"));

		assert!(matches!(
			identity.resolve("nope").await,
			Err(IdentityError::UnknownToken)
		));
	}

	#[test]
	fn schema_rejects_unknown_role() {
		let config: toml::Value = toml::from_str(
			r#"
[[accounts]]
token = "t"
id = "a"
email = "a@example.com"
name = "A"
role = "superuser"
"#,
		)
		.unwrap();

		assert!(StaticTableSchema.validate(&config).is_err());
		assert!(StaticTableSchema.validate(&sample_config()).is_ok());
	}

	#[test]
	fn duplicate_tokens_rejected() {
		let config: toml::Value = toml::from_str(
			r#"
[[accounts]]
token = "same"
id = "a"
email = "a@example.com"
name = "A"
role = "admin"

[[accounts]]
token = "same"
id = "b"
email = "b@example.com"
name = "B"
role = "subscriber"
"#,
		)
		.unwrap();

		assert!(create_identity(&config).is_err());
	}
}
