//! Order endpoints for the portal API.
//!
//! Thin adapters between the HTTP surface and the lifecycle handlers in
//! portal-core. Lifecycle errors carry their own HTTP status mapping, so
//! these functions only translate shapes.

use portal_core::PortalEngine;
use portal_types::{
	ActorContext, ApiError, CreateOrderRequest, CreateOrderResponse, EditLineItemRequest, Order,
	ReturnLabelRequest, TransitionRequest, UpdateOrderRequest,
};
use tracing::info;

/// Handles POST /api/orders requests.
pub async fn create_order(
	portal: &PortalEngine,
	request: CreateOrderRequest,
	actor: &ActorContext,
) -> Result<CreateOrderResponse, ApiError> {
	let order = portal.order_handler().create_order(request, actor).await?;
	info!(
		order_id = %order.id,
		order_number = order.order_number,
		"Order created via API"
	);
	Ok(CreateOrderResponse {
		id: order.id,
		order_number: order.order_number,
	})
}

/// Handles GET /api/orders/{id} requests.
pub async fn get_order(portal: &PortalEngine, id: &str) -> Result<Order, ApiError> {
	Ok(portal.order_handler().get_order(id).await?)
}

/// Handles PATCH /api/orders/{id} requests: a status transition.
pub async fn transition(
	portal: &PortalEngine,
	id: &str,
	request: TransitionRequest,
	actor: &ActorContext,
) -> Result<Order, ApiError> {
	Ok(portal
		.order_handler()
		.transition_status(id, request.status, actor)
		.await?)
}

/// Handles PUT /api/orders/{id} requests: a partial field edit.
pub async fn update_fields(
	portal: &PortalEngine,
	id: &str,
	request: UpdateOrderRequest,
	actor: &ActorContext,
) -> Result<Order, ApiError> {
	Ok(portal
		.order_handler()
		.update_fields(id, request, actor)
		.await?)
}

/// Handles POST /api/orders/{id}/stock requests: the idempotent commit.
pub async fn commit_stock(portal: &PortalEngine, id: &str) -> Result<Order, ApiError> {
	Ok(portal.stock_handler().commit_stock(id).await?)
}

/// Handles PUT /api/orders/{id}/items/{index} requests.
pub async fn edit_line_item(
	portal: &PortalEngine,
	id: &str,
	index: usize,
	request: EditLineItemRequest,
	actor: &ActorContext,
) -> Result<Order, ApiError> {
	Ok(portal
		.stock_handler()
		.edit_line_item(id, index, request.quantity, actor)
		.await?)
}

/// Handles DELETE /api/orders/{id}/items/{index} requests.
pub async fn delete_line_item(
	portal: &PortalEngine,
	id: &str,
	index: usize,
	actor: &ActorContext,
) -> Result<Order, ApiError> {
	Ok(portal
		.stock_handler()
		.delete_line_item(id, index, actor)
		.await?)
}

/// Handles PUT /api/orders/{id}/return-label requests.
pub async fn upload_return_label(
	portal: &PortalEngine,
	id: &str,
	request: ReturnLabelRequest,
	actor: &ActorContext,
) -> Result<Order, ApiError> {
	Ok(portal
		.order_handler()
		.upload_return_label(id, request.file, actor)
		.await?)
}

/// Handles DELETE /api/orders/{id}/return-label requests.
pub async fn remove_return_label(
	portal: &PortalEngine,
	id: &str,
	actor: &ActorContext,
) -> Result<Order, ApiError> {
	Ok(portal
		.order_handler()
		.remove_return_label(id, actor)
		.await?)
}
