//! Portal API endpoint implementations.

pub mod email;
pub mod notification;
pub mod order;
