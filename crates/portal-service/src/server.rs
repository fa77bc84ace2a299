//! HTTP server for the portal API.
//!
//! This module provides the HTTP server infrastructure for the portal API:
//! routing under `/api`, bearer-token authentication against the identity
//! service, and the JSON error envelope.

use axum::{
	extract::{DefaultBodyLimit, Path, State},
	http::{header, HeaderMap, StatusCode},
	response::Json,
	routing::{delete, get, patch, post, put},
	Router,
};
use portal_config::ApiConfig;
use portal_core::PortalEngine;
use portal_identity::IdentityError;
use portal_types::{
	ActorContext, ApiError, CreateOrderRequest, EditLineItemRequest, ReturnLabelRequest,
	SendEmailRequest, TransitionRequest, UpdateOrderRequest,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Reference to the portal engine for processing requests.
	pub portal: Arc<PortalEngine>,
}

/// Starts the HTTP server for the API.
///
/// This function creates and configures the HTTP server with routing,
/// middleware, and error handling for the portal endpoints.
pub async fn start_server(
	api_config: ApiConfig,
	portal: Arc<PortalEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(portal, api_config.max_request_size);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Portal API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

/// Builds the router with the /api base path.
pub fn router(portal: Arc<PortalEngine>, max_request_size: usize) -> Router {
	let app_state = AppState { portal };

	Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/orders", post(handle_create_order))
				.route(
					"/orders/{id}",
					get(handle_get_order)
						.patch(handle_transition)
						.put(handle_update_fields),
				)
				.route("/orders/{id}/stock", post(handle_commit_stock))
				.route(
					"/orders/{id}/items/{index}",
					put(handle_edit_line_item).delete(handle_delete_line_item),
				)
				.route(
					"/orders/{id}/return-label",
					put(handle_upload_return_label).delete(handle_remove_return_label),
				)
				.route("/notifications", get(handle_list_notifications))
				.route("/notifications/{id}/read", post(handle_mark_read))
				.route("/send-email", post(handle_send_email)),
		)
		.layer(
			ServiceBuilder::new()
				.layer(CorsLayer::permissive())
				.layer(DefaultBodyLimit::max(max_request_size)),
		)
		.with_state(app_state)
}

/// Resolves the bearer token in the Authorization header to an actor.
pub async fn authenticate(
	state: &AppState,
	headers: &HeaderMap,
) -> Result<ActorContext, ApiError> {
	let token = headers
		.get(header::AUTHORIZATION)
		.and_then(|v| v.to_str().ok())
		.and_then(|v| v.strip_prefix("Bearer "))
		.ok_or_else(|| ApiError::Unauthorized {
			message: "Missing bearer token".to_string(),
		})?;

	state
		.portal
		.identity()
		.authenticate(token)
		.await
		.map_err(|e| match e {
			IdentityError::UnknownToken => ApiError::Unauthorized {
				message: "Unknown token".to_string(),
			},
			IdentityError::NotApproved(account) => ApiError::Forbidden {
				message: format!("Account '{}' is not approved", account),
			},
			IdentityError::Implementation(e) => ApiError::InternalServerError { message: e },
		})
}

async fn handle_create_order(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<portal_types::CreateOrderResponse>), ApiError> {
	let actor = authenticate(&state, &headers).await?;
	let response = crate::apis::order::create_order(&state.portal, request, &actor).await?;
	Ok((StatusCode::CREATED, Json(response)))
}

async fn handle_get_order(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(id): Path<String>,
) -> Result<Json<portal_types::Order>, ApiError> {
	authenticate(&state, &headers).await?;
	let order = crate::apis::order::get_order(&state.portal, &id).await?;
	Ok(Json(order))
}

async fn handle_transition(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(id): Path<String>,
	Json(request): Json<TransitionRequest>,
) -> Result<Json<portal_types::Order>, ApiError> {
	let actor = authenticate(&state, &headers).await?;
	let order = crate::apis::order::transition(&state.portal, &id, request, &actor).await?;
	Ok(Json(order))
}

async fn handle_update_fields(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(id): Path<String>,
	Json(request): Json<UpdateOrderRequest>,
) -> Result<Json<portal_types::Order>, ApiError> {
	let actor = authenticate(&state, &headers).await?;
	let order = crate::apis::order::update_fields(&state.portal, &id, request, &actor).await?;
	Ok(Json(order))
}

async fn handle_commit_stock(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(id): Path<String>,
) -> Result<Json<portal_types::Order>, ApiError> {
	authenticate(&state, &headers).await?;
	let order = crate::apis::order::commit_stock(&state.portal, &id).await?;
	Ok(Json(order))
}

async fn handle_edit_line_item(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((id, index)): Path<(String, usize)>,
	Json(request): Json<EditLineItemRequest>,
) -> Result<Json<portal_types::Order>, ApiError> {
	let actor = authenticate(&state, &headers).await?;
	let order =
		crate::apis::order::edit_line_item(&state.portal, &id, index, request, &actor).await?;
	Ok(Json(order))
}

async fn handle_delete_line_item(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path((id, index)): Path<(String, usize)>,
) -> Result<Json<portal_types::Order>, ApiError> {
	let actor = authenticate(&state, &headers).await?;
	let order = crate::apis::order::delete_line_item(&state.portal, &id, index, &actor).await?;
	Ok(Json(order))
}

async fn handle_upload_return_label(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(id): Path<String>,
	Json(request): Json<ReturnLabelRequest>,
) -> Result<Json<portal_types::Order>, ApiError> {
	let actor = authenticate(&state, &headers).await?;
	let order =
		crate::apis::order::upload_return_label(&state.portal, &id, request, &actor).await?;
	Ok(Json(order))
}

async fn handle_remove_return_label(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(id): Path<String>,
) -> Result<Json<portal_types::Order>, ApiError> {
	let actor = authenticate(&state, &headers).await?;
	let order = crate::apis::order::remove_return_label(&state.portal, &id, &actor).await?;
	Ok(Json(order))
}

async fn handle_list_notifications(
	State(state): State<AppState>,
	headers: HeaderMap,
) -> Result<Json<Vec<portal_types::Notification>>, ApiError> {
	authenticate(&state, &headers).await?;
	let notifications = crate::apis::notification::list(&state.portal).await?;
	Ok(Json(notifications))
}

async fn handle_mark_read(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(id): Path<String>,
) -> Result<Json<portal_types::Notification>, ApiError> {
	authenticate(&state, &headers).await?;
	let notification = crate::apis::notification::mark_read(&state.portal, &id).await?;
	Ok(Json(notification))
}

async fn handle_send_email(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(request): Json<SendEmailRequest>,
) -> Result<StatusCode, ApiError> {
	let actor = authenticate(&state, &headers).await?;
	crate::apis::email::send(&state.portal, request, &actor).await?;
	Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::Body;
	use axum::http::Request;
	use portal_core::{PortalBuilder, PortalFactories};
	use portal_types::{Product, StorageKey};
	use std::str::FromStr;
	use tower::util::ServiceExt;

	const CONFIG: &str = r#"
		[portal]
		id = "test-portal"

		[storage]
		primary = "memory"
		cleanup_interval_seconds = 3600
		[storage.implementations.memory]

		[identity]
		primary = "static"
		[identity.implementations.static]
		accounts = [
			{ token = "tok-sub", id = "acct-1", email = "sub@example.com", name = "Sub", role = "subscriber" },
			{ token = "tok-pm", id = "acct-2", email = "pm@example.com", name = "PM", role = "program_manager" },
			{ token = "tok-pending", id = "acct-3", email = "p@example.com", name = "P", role = "subscriber", approval = "pending" },
		]

		[notifications]
		primary = "log"
		ops_mailbox = "orders@example.com"
		from_address = "portal@example.com"
		[notifications.implementations.log]
	"#;

	async fn test_router() -> Router {
		let config = portal_config::Config::from_str(CONFIG).unwrap();
		let engine = PortalBuilder::new(config)
			.build(PortalFactories {
				storage_factories: portal_storage::get_all_implementations()
					.into_iter()
					.map(|(n, f)| (n.to_string(), f))
					.collect(),
				identity_factories: portal_identity::get_all_implementations()
					.into_iter()
					.map(|(n, f)| (n.to_string(), f))
					.collect(),
				notifier_factories: portal_notify::get_all_implementations()
					.into_iter()
					.map(|(n, f)| (n.to_string(), f))
					.collect(),
			})
			.await
			.unwrap();

		let product = Product {
			id: "p-1".to_string(),
			name: "Demo Laptop".to_string(),
			sku: "LAP-1".to_string(),
			brand: "Acme".to_string(),
			processor: "X1".to_string(),
			memory: "16GB".to_string(),
			stock_quantity: 10,
		};
		engine
			.storage()
			.store(StorageKey::Products.as_str(), &product.id, &product)
			.await
			.unwrap();

		router(Arc::new(engine), 1024 * 1024)
	}

	fn order_body() -> Body {
		Body::from(
			serde_json::json!({
				"cart": [{"product_id": "p-1", "quantity": 2}],
				"units": 4,
				"budget": 250.0,
				"shipping": {
					"company": "Acme Corp",
					"contact_name": "Dana",
					"contact_email": "dana@example.com",
					"address": "1 Main St",
					"city": "Springfield",
					"state": "IL",
					"zip": "62701"
				}
			})
			.to_string(),
		)
	}

	fn request(method: &str, uri: &str, token: Option<&str>, body: Body) -> Request<Body> {
		let mut builder = Request::builder()
			.method(method)
			.uri(uri)
			.header(header::CONTENT_TYPE, "application/json");
		if let Some(token) = token {
			builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
		}
		builder.body(body).unwrap()
	}

	#[tokio::test]
	async fn missing_or_unknown_token_is_unauthorized() {
		let app = test_router().await;
		let response = app
			.clone()
			.oneshot(request("POST", "/api/orders", None, order_body()))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

		let response = app
			.oneshot(request("POST", "/api/orders", Some("tok-bogus"), order_body()))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
	}

	#[tokio::test]
	async fn pending_account_is_forbidden() {
		let app = test_router().await;
		let response = app
			.oneshot(request("POST", "/api/orders", Some("tok-pending"), order_body()))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::FORBIDDEN);
	}

	#[tokio::test]
	async fn subscriber_creates_but_cannot_approve() {
		let app = test_router().await;
		let response = app
			.clone()
			.oneshot(request("POST", "/api/orders", Some("tok-sub"), order_body()))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::CREATED);

		// Any transition attempt by a subscriber is rejected
		let response = app
			.oneshot(request(
				"PATCH",
				"/api/orders/nonexistent",
				Some("tok-sub"),
				Body::from(r#"{"status":"approved"}"#),
			))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::NOT_FOUND);
	}

	#[tokio::test]
	async fn unknown_order_is_not_found() {
		let app = test_router().await;
		let response = app
			.oneshot(request(
				"GET",
				"/api/orders/nonexistent",
				Some("tok-pm"),
				Body::empty(),
			))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::NOT_FOUND);
	}

	#[tokio::test]
	async fn send_email_is_staff_only() {
		let app = test_router().await;
		let body = r#"{"template":"DEMO_EXPIRY_REMINDER","recipient":"dana@example.com","data":{}}"#;
		let response = app
			.clone()
			.oneshot(request(
				"POST",
				"/api/send-email",
				Some("tok-sub"),
				Body::from(body),
			))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::FORBIDDEN);

		let response = app
			.oneshot(request(
				"POST",
				"/api/send-email",
				Some("tok-pm"),
				Body::from(body),
			))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::NO_CONTENT);
	}
}
