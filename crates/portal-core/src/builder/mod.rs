//! Builder pattern for constructing portal engines.
//!
//! Provides a flexible way to compose a PortalEngine from various service
//! implementations using factory functions. Supports pluggable storage,
//! identity, and notifier implementations.

use crate::engine::PortalEngine;
use portal_config::Config;
use portal_identity::{IdentityError, IdentityInterface, IdentityService};
use portal_notify::{NotifierInterface, NotifierService, NotifyError};
use portal_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during portal engine construction.
///
/// These errors indicate problems with configuration or missing required
/// components when building a portal engine instance.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Container for all factory functions needed to build a PortalEngine.
///
/// This struct holds factory functions for creating implementations of each
/// service type required by the portal engine. Each factory function takes
/// a TOML configuration value and returns the corresponding service
/// implementation.
pub struct PortalFactories<SF, IF, NF> {
	pub storage_factories: HashMap<String, SF>,
	pub identity_factories: HashMap<String, IF>,
	pub notifier_factories: HashMap<String, NF>,
}

/// Builder for constructing a PortalEngine with pluggable implementations.
pub struct PortalBuilder {
	config: Config,
}

impl PortalBuilder {
	/// Creates a new PortalBuilder with the given configuration.
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the PortalEngine using factories for each component type.
	pub async fn build<SF, IF, NF>(
		self,
		factories: PortalFactories<SF, IF, NF>,
	) -> Result<PortalEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		IF: Fn(&toml::Value) -> Result<Box<dyn IdentityInterface>, IdentityError>,
		NF: Fn(&toml::Value) -> Result<Box<dyn NotifierInterface>, NotifyError>,
	{
		// Create storage implementations
		let mut storage_impls = HashMap::new();
		for (name, config) in &self.config.storage.implementations {
			if let Some(factory) = factories.storage_factories.get(name) {
				match factory(config) {
					Ok(implementation) => {
						// Validate the configuration using the implementation's schema
						if let Err(e) = implementation.config_schema().validate(config) {
							tracing::error!(
								component = "storage",
								implementation = %name,
								error = %e,
								"Invalid configuration for storage implementation"
							);
							return Err(BuilderError::Config(format!(
								"Invalid configuration for storage implementation '{}': {}",
								name, e
							)));
						}
						storage_impls.insert(name.clone(), implementation);
						let is_primary = &self.config.storage.primary == name;
						tracing::info!(component = "storage", implementation = %name, enabled = %is_primary, "Loaded");
					}
					Err(e) => {
						tracing::error!(
							component = "storage",
							implementation = %name,
							error = %e,
							"Failed to create storage implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create storage implementation '{}': {}",
							name, e
						)));
					}
				}
			}
		}

		let primary_storage = &self.config.storage.primary;
		let storage_backend = storage_impls.remove(primary_storage).ok_or_else(|| {
			BuilderError::Config(format!(
				"Primary storage '{}' failed to load or has invalid configuration",
				primary_storage
			))
		})?;
		let storage = Arc::new(StorageService::new(storage_backend));

		// Create identity implementations
		let mut identity_impls = HashMap::new();
		for (name, config) in &self.config.identity.implementations {
			if let Some(factory) = factories.identity_factories.get(name) {
				match factory(config) {
					Ok(implementation) => {
						// Validate the configuration using the implementation's schema
						if let Err(e) = implementation.config_schema().validate(config) {
							tracing::error!(
								component = "identity",
								implementation = %name,
								error = %e,
								"Invalid configuration for identity implementation"
							);
							return Err(BuilderError::Config(format!(
								"Invalid configuration for identity implementation '{}': {}",
								name, e
							)));
						}
						identity_impls.insert(name.clone(), implementation);
						let is_primary = &self.config.identity.primary == name;
						tracing::info!(component = "identity", implementation = %name, enabled = %is_primary, "Loaded");
					}
					Err(e) => {
						tracing::error!(
							component = "identity",
							implementation = %name,
							error = %e,
							"Failed to create identity implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create identity implementation '{}': {}",
							name, e
						)));
					}
				}
			}
		}

		let primary_identity = &self.config.identity.primary;
		let identity_backend = identity_impls.remove(primary_identity).ok_or_else(|| {
			BuilderError::MissingComponent(format!("identity '{}'", primary_identity))
		})?;
		let identity = Arc::new(IdentityService::new(identity_backend));

		// Create notifier implementations
		let mut notifier_impls = HashMap::new();
		for (name, config) in &self.config.notifications.implementations {
			if let Some(factory) = factories.notifier_factories.get(name) {
				match factory(config) {
					Ok(implementation) => {
						// Validate the configuration using the implementation's schema
						if let Err(e) = implementation.config_schema().validate(config) {
							tracing::error!(
								component = "notifier",
								implementation = %name,
								error = %e,
								"Invalid configuration for notifier implementation"
							);
							return Err(BuilderError::Config(format!(
								"Invalid configuration for notifier implementation '{}': {}",
								name, e
							)));
						}
						notifier_impls.insert(name.clone(), implementation);
						let is_primary = &self.config.notifications.primary == name;
						tracing::info!(component = "notifier", implementation = %name, enabled = %is_primary, "Loaded");
					}
					Err(e) => {
						tracing::error!(
							component = "notifier",
							implementation = %name,
							error = %e,
							"Failed to create notifier implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create notifier implementation '{}': {}",
							name, e
						)));
					}
				}
			}
		}

		let primary_notifier = &self.config.notifications.primary;
		let notifier_backend = notifier_impls.remove(primary_notifier).ok_or_else(|| {
			BuilderError::MissingComponent(format!("notifier '{}'", primary_notifier))
		})?;
		let notifier = Arc::new(NotifierService::new(
			notifier_backend,
			self.config.notifications.from_address.clone(),
		));

		Ok(PortalEngine::new(self.config, storage, identity, notifier))
	}
}
