//! Notification feed endpoints for the portal API.

use portal_core::PortalEngine;
use portal_types::{ApiError, Notification};

/// Handles GET /api/notifications requests, newest first.
pub async fn list(portal: &PortalEngine) -> Result<Vec<Notification>, ApiError> {
	Ok(portal.order_handler().list_notifications().await?)
}

/// Handles POST /api/notifications/{id}/read requests.
pub async fn mark_read(portal: &PortalEngine, id: &str) -> Result<Notification, ApiError> {
	Ok(portal.order_handler().mark_notification_read(id).await?)
}
