//! Identity module for the demo portal system.
//!
//! This module provides abstractions for resolving bearer tokens to account
//! profiles. It defines interfaces and services for authentication, and the
//! ActorContext handed to every order operation is built here so role checks
//! downstream never depend on ambient session state.

use async_trait::async_trait;
use portal_types::{ActorContext, ApprovalStatus, ConfigSchema, ImplementationRegistry, Profile};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod static_table;
}

/// Errors that can occur during identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
	/// The presented token does not resolve to any account.
	#[error("Unknown token")]
	UnknownToken,
	/// The account exists but has not been approved for access.
	#[error("Account '{0}' is not approved")]
	NotApproved(String),
	/// Error that occurs when interacting with the identity implementation.
	#[error("Implementation error: {0}")]
	Implementation(String),
}

/// Trait defining the interface for identity implementations.
///
/// This trait must be implemented by any identity implementation that wants to
/// integrate with the portal. It resolves an opaque bearer token to the full
/// account profile, including role and approval status.
#[async_trait]
pub trait IdentityInterface: Send + Sync {
	/// Returns the configuration schema for this identity implementation.
	///
	/// This allows each implementation to define its own configuration requirements
	/// with specific validation rules. The schema is used to validate TOML configuration
	/// before initializing the identity implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Resolves a bearer token to the account profile it belongs to.
	///
	/// Returns `IdentityError::UnknownToken` when the token matches no account.
	async fn resolve(&self, token: &str) -> Result<Profile, IdentityError>;
}

/// Type alias for identity factory functions.
///
/// This is the function signature that all identity implementations must provide
/// to create instances of their identity interface.
pub type IdentityFactory = fn(&toml::Value) -> Result<Box<dyn IdentityInterface>, IdentityError>;

/// Registry trait for identity implementations.
pub trait IdentityRegistry: ImplementationRegistry<Factory = IdentityFactory> {}

/// Get all registered identity implementations.
pub fn get_all_implementations() -> Vec<(&'static str, IdentityFactory)> {
	use implementations::static_table;

	vec![(static_table::Registry::NAME, static_table::Registry::factory())]
}

/// Service that manages identity resolution.
///
/// This struct provides a high-level interface for authentication, wrapping an
/// underlying identity implementation. Unapproved accounts are rejected here,
/// before any request handler sees them.
pub struct IdentityService {
	/// The underlying identity implementation.
	implementation: Box<dyn IdentityInterface>,
}

impl IdentityService {
	/// Creates a new IdentityService with the specified implementation.
	pub fn new(implementation: Box<dyn IdentityInterface>) -> Self {
		Self { implementation }
	}

	/// Authenticates a bearer token and returns the acting identity.
	///
	/// Accounts whose approval status is not `Approved` are rejected with
	/// `IdentityError::NotApproved`.
	pub async fn authenticate(&self, token: &str) -> Result<ActorContext, IdentityError> {
		let profile = self.implementation.resolve(token).await?;
		if profile.approval != ApprovalStatus::Approved {
			return Err(IdentityError::NotApproved(profile.email));
		}
		Ok(ActorContext::from_profile(&profile))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use portal_types::Role;

	struct FixedIdentity {
		profile: Profile,
	}

	#[async_trait]
	impl IdentityInterface for FixedIdentity {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			unimplemented!("not exercised in tests")
		}

		async fn resolve(&self, token: &str) -> Result<Profile, IdentityError> {
			if token == "good-token" {
				Ok(self.profile.clone())
			} else {
				Err(IdentityError::UnknownToken)
			}
		}
	}

	fn profile(approval: ApprovalStatus) -> Profile {
		Profile {
			id: "acct-1".to_string(),
			email: "manager@example.com".to_string(),
			name: "Program Manager".to_string(),
			role: Role::ProgramManager,
			approval,
			reseller: None,
		}
	}

	#[tokio::test]
	async fn authenticate_builds_actor_context() {
		let service = IdentityService::new(Box::new(FixedIdentity {
			profile: profile(ApprovalStatus::Approved),
		}));

		let actor = service.authenticate("good-token").await.unwrap();
		assert_eq!(actor.id, "acct-1");
		assert_eq!(actor.role, Role::ProgramManager);
	}

	#[tokio::test]
	async fn authenticate_rejects_pending_accounts() {
		let service = IdentityService::new(Box::new(FixedIdentity {
			profile: profile(ApprovalStatus::Pending),
		}));

		assert!(matches!(
			service.authenticate("good-token").await,
			Err(IdentityError::NotApproved(_))
		));
	}

	#[tokio::test]
	async fn authenticate_rejects_unknown_tokens() {
		let service = IdentityService::new(Box::new(FixedIdentity {
			profile: profile(ApprovalStatus::Approved),
		}));

		assert!(matches!(
			service.authenticate("bad-token").await,
			Err(IdentityError::UnknownToken)
		));
	}
}
