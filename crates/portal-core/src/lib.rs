//! Core portal engine that orchestrates the demo-kit order lifecycle.
//!
//! This crate ties the pluggable services (storage, identity, notification
//! delivery) together into the [`engine::PortalEngine`]: order creation and
//! role-gated status transitions, idempotent stock commitment, the demo
//! expiry sweep, and the notification outbox worker.

pub mod builder;
pub mod engine;
pub mod handlers;
pub mod outbox;
pub mod state;
pub mod sweep;
pub(crate) mod utils;

pub use builder::{BuilderError, PortalBuilder, PortalFactories};
pub use engine::PortalEngine;
pub use handlers::LifecycleError;
