//! Core portal engine that runs the background lifecycle tasks.
//!
//! This module contains the main PortalEngine struct which wires the
//! services (storage, identity, notifications) and handlers together and
//! drives the interval tasks: the outbox drain, the demo-expiry sweep, and
//! storage cleanup.

use crate::handlers::{OrderHandler, StockHandler};
use crate::outbox::OutboxWorker;
use crate::state::OrderStateMachine;
use crate::sweep::DemoSweep;
use portal_config::Config;
use portal_identity::IdentityService;
use portal_notify::NotifierService;
use portal_storage::StorageService;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
}

/// Main portal engine driving the order-lifecycle background tasks.
#[derive(Clone)]
pub struct PortalEngine {
	/// Portal configuration.
	pub(crate) config: Config,
	/// Storage service for persisting state.
	pub(crate) storage: Arc<StorageService>,
	/// Identity service resolving bearer tokens to actors.
	pub(crate) identity: Arc<IdentityService>,
	/// Notifier service for outbound email.
	pub(crate) notifier: Arc<NotifierService>,
	/// Order state machine.
	#[allow(dead_code)]
	pub(crate) state_machine: Arc<OrderStateMachine>,
	/// Order lifecycle handler.
	pub(crate) order_handler: Arc<OrderHandler>,
	/// Stock commitment handler.
	pub(crate) stock_handler: Arc<StockHandler>,
	/// Demo-expiry sweep task.
	pub(crate) sweep: Arc<DemoSweep>,
	/// Outbox delivery worker.
	pub(crate) outbox_worker: Arc<OutboxWorker>,
}

impl std::fmt::Debug for PortalEngine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PortalEngine").finish_non_exhaustive()
	}
}

impl PortalEngine {
	/// Creates a new portal engine with the given services.
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		identity: Arc<IdentityService>,
		notifier: Arc<NotifierService>,
	) -> Self {
		let state_machine = Arc::new(OrderStateMachine::new(storage.clone()));
		let ops_mailbox = config.notifications.ops_mailbox.clone();

		let order_handler = Arc::new(OrderHandler::new(
			storage.clone(),
			state_machine.clone(),
			ops_mailbox.clone(),
		));
		let stock_handler = Arc::new(StockHandler::new(storage.clone()));
		let sweep = Arc::new(DemoSweep::new(
			storage.clone(),
			ops_mailbox,
			config.sweep.clone(),
		));
		let outbox_worker = Arc::new(OutboxWorker::new(
			storage.clone(),
			notifier.clone(),
			config.outbox.max_attempts,
		));

		Self {
			config,
			storage,
			identity,
			notifier,
			state_machine,
			order_handler,
			stock_handler,
			sweep,
			outbox_worker,
		}
	}

	/// Main execution loop for the portal engine.
	///
	/// Drives the interval tasks until a ctrl-c shutdown signal arrives.
	pub async fn run(&self) -> Result<(), EngineError> {
		let mut outbox_interval =
			tokio::time::interval(Duration::from_secs(self.config.outbox.interval_seconds));
		let mut sweep_interval =
			tokio::time::interval(Duration::from_secs(self.config.sweep.interval_seconds));
		let mut cleanup_interval = tokio::time::interval(Duration::from_secs(
			self.config.storage.cleanup_interval_seconds,
		));

		tracing::info!(
			portal = %self.config.portal.id,
			"Portal engine started"
		);

		loop {
			tokio::select! {
				_ = outbox_interval.tick() => {
					match self.outbox_worker.run_once().await {
						Ok(delivered) if delivered > 0 => {
							tracing::debug!("Outbox drain: delivered {} records", delivered);
						}
						Err(e) => {
							tracing::warn!("Outbox drain failed: {}", e);
						}
						_ => {}
					}
				}

				_ = sweep_interval.tick() => {
					let today = chrono::Utc::now().date_naive();
					if let Err(e) = self.sweep.run_once(today).await {
						tracing::warn!("Demo-expiry sweep failed: {}", e);
					}
				}

				_ = cleanup_interval.tick() => {
					match self.storage.cleanup_expired().await {
						Ok(count) if count > 0 => {
							tracing::debug!("Storage cleanup: removed {} expired entries", count);
						}
						Err(e) => {
							tracing::warn!("Storage cleanup failed: {}", e);
						}
						_ => {}
					}
				}

				// Shutdown signal
				_ = tokio::signal::ctrl_c() => {
					break;
				}
			}
		}

		tracing::info!("Portal engine stopped");
		Ok(())
	}

	/// Returns a reference to the configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Returns a reference to the storage service.
	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	/// Returns a reference to the identity service.
	pub fn identity(&self) -> &Arc<IdentityService> {
		&self.identity
	}

	/// Returns a reference to the notifier service.
	pub fn notifier(&self) -> &Arc<NotifierService> {
		&self.notifier
	}

	/// Returns a reference to the order lifecycle handler.
	pub fn order_handler(&self) -> &Arc<OrderHandler> {
		&self.order_handler
	}

	/// Returns a reference to the stock commitment handler.
	pub fn stock_handler(&self) -> &Arc<StockHandler> {
		&self.stock_handler
	}
}
