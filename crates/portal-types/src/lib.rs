//! Common types module for the demo-kit ordering portal.
//!
//! This module defines the core data types and structures shared across
//! portal services. It provides a centralized location for domain types
//! to ensure consistency across all components.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Notification, email template, and outbox types.
pub mod notification;
/// Order types including line items, shipping, and fulfillment data.
pub mod order;
/// Product catalog types.
pub mod product;
/// Profile, role, and actor-context types.
pub mod profile;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Secure string type for credentials.
pub mod secret_string;
/// Storage namespace types.
pub mod storage;
/// Configuration validation types for type-safe TOML configurations.
pub mod validation;

// Re-export all types for convenient access
pub use api::*;
pub use notification::*;
pub use order::*;
pub use product::*;
pub use profile::*;
pub use registry::*;
pub use secret_string::*;
pub use storage::*;
pub use validation::*;
