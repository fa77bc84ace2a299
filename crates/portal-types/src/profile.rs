//! Profile and role types driving authorization across the portal.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A portal account profile, one per identity-provider account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
	/// Identity-provider account id.
	pub id: String,
	/// Contact email for this account.
	pub email: String,
	/// Display name.
	pub name: String,
	/// Role claim driving authorization.
	pub role: Role,
	/// Whether this account has been approved for portal access.
	#[serde(default)]
	pub approval: ApprovalStatus,
	/// Reseller affiliation, if any.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reseller: Option<String>,
}

/// Role claim attached to every authenticated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	Admin,
	ProgramManager,
	ShopManager,
	Subscriber,
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Role::Admin => write!(f, "admin"),
			Role::ProgramManager => write!(f, "program_manager"),
			Role::ShopManager => write!(f, "shop_manager"),
			Role::Subscriber => write!(f, "subscriber"),
		}
	}
}

impl FromStr for Role {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"admin" => Ok(Role::Admin),
			"program_manager" => Ok(Role::ProgramManager),
			"shop_manager" => Ok(Role::ShopManager),
			"subscriber" => Ok(Role::Subscriber),
			_ => Err(()),
		}
	}
}

/// Approval state of a profile. Only approved profiles may act.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
	Pending,
	Approved,
	Rejected,
}

impl Default for ApprovalStatus {
	fn default() -> Self {
		ApprovalStatus::Pending
	}
}

/// Authenticated caller identity passed into every lifecycle operation.
///
/// Carrying the identity and role explicitly keeps authorization decisions
/// testable in isolation instead of reading ambient profile state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorContext {
	/// Identity-provider account id of the caller.
	pub id: String,
	/// Contact email of the caller.
	pub email: String,
	/// Role claim of the caller.
	pub role: Role,
}

impl ActorContext {
	/// Builds an actor context from an approved profile.
	pub fn from_profile(profile: &Profile) -> Self {
		Self {
			id: profile.id.clone(),
			email: profile.email.clone(),
			role: profile.role,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn role_parses_wire_names() {
		assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
		assert_eq!(
			"program_manager".parse::<Role>().unwrap(),
			Role::ProgramManager
		);
		assert!("manager".parse::<Role>().is_err());
	}

	#[test]
	fn approval_defaults_to_pending() {
		let profile: Profile = serde_json::from_str(
			r#"{"id":"u1","email":"u1@example.com","name":"U One","role":"subscriber"}"#,
		)
		.unwrap();
		assert_eq!(profile.approval, ApprovalStatus::Pending);
	}
}
