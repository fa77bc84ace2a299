//! Direct email endpoint for the portal API.

use portal_core::PortalEngine;
use portal_types::{ActorContext, ApiError, Role, SendEmailRequest};
use tracing::warn;

/// Handles POST /api/send-email requests: a synchronous template send.
///
/// Unlike lifecycle mail this bypasses the outbox; the caller learns
/// immediately whether delivery succeeded.
pub async fn send(
	portal: &PortalEngine,
	request: SendEmailRequest,
	actor: &ActorContext,
) -> Result<(), ApiError> {
	if actor.role == Role::Subscriber {
		return Err(ApiError::Forbidden {
			message: format!("Role {} may not send email directly", actor.role),
		});
	}
	if request.recipient.is_empty() {
		return Err(ApiError::BadRequest {
			error_type: "VALIDATION".to_string(),
			message: "Recipient cannot be empty".to_string(),
		});
	}

	portal
		.notifier()
		.send(request.template, &request.recipient, &request.data)
		.await
		.map_err(|e| {
			warn!(
				template = %request.template,
				error = %e,
				"Direct email send failed"
			);
			ApiError::InternalServerError {
				message: e.to_string(),
			}
		})
}
