//! Main entry point for the demo-kit portal service.
//!
//! This binary provides a complete ordering portal that creates, approves,
//! ships, and tracks demo-kit orders. It uses a modular architecture with
//! pluggable implementations for storage, identity, and notifications.

use clap::Parser;
use portal_config::Config;
use portal_core::{PortalBuilder, PortalEngine, PortalFactories};
use std::path::PathBuf;
use std::sync::Arc;

mod apis;
mod server;

// Import implementations from individual crates
use portal_identity::implementations::static_table::create_identity;
use portal_notify::implementations::http::create_notifier as create_http_notifier;
use portal_notify::implementations::log::create_notifier as create_log_notifier;
use portal_storage::implementations::file::create_storage as create_file_storage;
use portal_storage::implementations::memory::create_storage as create_memory_storage;

/// Command-line arguments for the portal service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

/// Main entry point for the portal service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Builds the portal engine with all implementations
/// 5. Runs the portal until interrupted
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started portal");

	// Load configuration
	let config = Config::from_file(args.config.to_str().ok_or("Invalid config path")?).await?;
	tracing::info!("Loaded configuration [{}]", config.portal.id);

	// Build portal engine with implementations
	let portal = build_portal(config.clone()).await?;
	let portal = Arc::new(portal);

	// Check if API server should be started
	let api_enabled = config.api.as_ref().is_some_and(|api| api.enabled);

	if api_enabled {
		let api_config = config.api.as_ref().ok_or("Missing API config")?.clone();
		let api_portal = Arc::clone(&portal);

		// Run the background tasks and the API server concurrently
		let engine_task = portal.run();
		let api_task = server::start_server(api_config, api_portal);

		tokio::select! {
			result = engine_task => {
				tracing::info!("Portal engine finished");
				result?;
			}
			result = api_task => {
				tracing::info!("API server finished");
				result?;
			}
		}
	} else {
		tracing::info!("Starting background tasks only");
		portal.run().await?;
	}

	tracing::info!("Stopped portal");
	Ok(())
}

/// Macro to create a factory HashMap with the appropriate type aliases
macro_rules! create_factory_map {
    ($interface:path, $error:path, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};
}

/// Builds the portal engine with all necessary implementations.
///
/// This function wires up the concrete implementations for:
/// - Storage backends (file, in-memory)
/// - Identity providers (static account table)
/// - Notifiers (HTTP mail relay, log-only)
async fn build_portal(config: Config) -> Result<PortalEngine, Box<dyn std::error::Error>> {
	let builder = PortalBuilder::new(config);

	let storage_factories = create_factory_map!(
		portal_storage::StorageInterface,
		portal_storage::StorageError,
		"file" => create_file_storage,
		"memory" => create_memory_storage,
	);

	let identity_factories = create_factory_map!(
		portal_identity::IdentityInterface,
		portal_identity::IdentityError,
		"static" => create_identity,
	);

	let notifier_factories = create_factory_map!(
		portal_notify::NotifierInterface,
		portal_notify::NotifyError,
		"http" => create_http_notifier,
		"log" => create_log_notifier,
	);

	let engine = builder
		.build(PortalFactories {
			storage_factories,
			identity_factories,
			notifier_factories,
		})
		.await?;

	Ok(engine)
}
