//! Order lifecycle handler.
//!
//! Handles order creation, role-gated status transitions, field edits, and
//! the return-label attachment. Transitions append outbox records and a feed
//! notification after the status write commits; delivery itself is the
//! outbox worker's job and never fails a mutation here.

use crate::handlers::LifecycleError;
use crate::outbox;
use crate::state::{self, OrderStateMachine};
use crate::utils::{truncate_id, unix_now};
use portal_storage::{StorageError, StorageService};
use portal_types::{
	ActorContext, CreateOrderRequest, DemoStatus, EmailTemplate, FulfillmentInfo, Notification,
	NotificationKind, Order, OrderStatus, Product, Role, StorageKey, UpdateOrderRequest,
};
use std::sync::Arc;
use tracing::instrument;

/// Retries for validate-then-swap loops that race concurrent writers.
const MAX_SWAP_RETRIES: usize = 16;

/// Storage id of the order-number sequence counter.
const ORDER_COUNTER_ID: &str = "orders";

/// Handler for order creation, transitions, and edits.
pub struct OrderHandler {
	storage: Arc<StorageService>,
	state_machine: Arc<OrderStateMachine>,
	/// Mailbox receiving the operations copy of order mail.
	ops_mailbox: String,
}

impl OrderHandler {
	pub fn new(
		storage: Arc<StorageService>,
		state_machine: Arc<OrderStateMachine>,
		ops_mailbox: String,
	) -> Self {
		Self {
			storage,
			state_machine,
			ops_mailbox,
		}
	}

	/// Creates a new pending order from a checkout cart.
	///
	/// Line items are snapshots of the referenced products, the order number
	/// comes from a compare-and-swap sequence counter, and stock is not
	/// touched; committing stock is a separate idempotent step.
	#[instrument(skip_all, fields(actor = %actor.email))]
	pub async fn create_order(
		&self,
		request: CreateOrderRequest,
		actor: &ActorContext,
	) -> Result<Order, LifecycleError> {
		if request.cart.is_empty() {
			return Err(LifecycleError::Validation("Cart cannot be empty".into()));
		}
		if request.units == 0 {
			return Err(LifecycleError::Validation(
				"Units must be greater than zero".into(),
			));
		}
		if request.budget < 0.0 {
			return Err(LifecycleError::Validation(
				"Budget cannot be negative".into(),
			));
		}
		if request.shipping.contact_email.is_empty() {
			return Err(LifecycleError::Validation(
				"Shipping contact email is required".into(),
			));
		}

		let mut line_items = Vec::with_capacity(request.cart.len());
		for line in &request.cart {
			if line.quantity == 0 {
				return Err(LifecycleError::Validation(format!(
					"Quantity for product {} must be greater than zero",
					line.product_id
				)));
			}
			let product: Product = self
				.storage
				.retrieve(StorageKey::Products.as_str(), &line.product_id)
				.await
				.map_err(|e| match e {
					StorageError::NotFound => LifecycleError::Validation(format!(
						"Unknown product: {}",
						line.product_id
					)),
					other => LifecycleError::Persistence(other.to_string()),
				})?;
			line_items.push(product.snapshot(line.quantity));
		}

		let now = unix_now();
		let mut order = Order {
			id: uuid::Uuid::new_v4().to_string(),
			order_number: self.next_order_number().await?,
			status: OrderStatus::Pending,
			created_at: now,
			updated_at: now,
			units: request.units,
			budget: request.budget,
			revenue: 0.0,
			account_id: request.opportunity.account_id,
			quote_id: request.opportunity.quote_id,
			segment: request.opportunity.segment,
			manufacturer: request.opportunity.manufacturer,
			reseller: request.opportunity.reseller,
			shipping: request.shipping,
			fulfillment: FulfillmentInfo::default(),
			line_items,
			approved_by: None,
			approved_at: None,
			stock_committed: false,
			demo_status: DemoStatus::Active,
			demo_expiry_date: request.demo_expiry_date,
			returned_at: None,
		};
		order.recompute_revenue();

		self.state_machine.store_order(&order).await?;
		tracing::info!(
			order_id = %truncate_id(&order.id),
			order_number = order.order_number,
			actor = %actor.email,
			"Order created"
		);
		Ok(order)
	}

	/// Transitions an order to a new status.
	///
	/// Permission is a pure function of (from, to, role); privileged moves
	/// outside the nominal workflow are allowed but logged. The first move
	/// into approved stamps `approved_by`/`approved_at` exactly once.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), to = %to))]
	pub async fn transition_status(
		&self,
		order_id: &str,
		to: OrderStatus,
		actor: &ActorContext,
	) -> Result<Order, LifecycleError> {
		for _ in 0..MAX_SWAP_RETRIES {
			let (order, prior) = self.retrieve_order_versioned(order_id).await?;

			if !state::is_transition_allowed(actor.role, order.status, to) {
				return Err(LifecycleError::Forbidden(format!(
					"Role {} may not move an order from {} to {}",
					actor.role, order.status, to
				)));
			}
			if !state::is_nominal_transition(order.status, to) {
				tracing::info!(
					from = %order.status,
					to = %to,
					actor = %actor.email,
					role = %actor.role,
					"Privileged transition outside the nominal workflow"
				);
			}

			let now = unix_now();
			let mut updated = order;
			updated.status = to;
			updated.updated_at = now;
			if to == OrderStatus::Approved && updated.approved_by.is_none() {
				updated.approved_by = Some(actor.id.clone());
				updated.approved_at = Some(now);
			}
			if to == OrderStatus::Return && updated.returned_at.is_none() {
				updated.returned_at = Some(now);
			}

			if self
				.storage
				.replace_versioned(StorageKey::Orders.as_str(), order_id, &prior, &updated)
				.await?
			{
				self.fan_out(&updated).await;
				return Ok(updated);
			}
		}
		Err(LifecycleError::Persistence(format!(
			"Contention on order {}",
			order_id
		)))
	}

	/// Applies a partial field edit to an order.
	///
	/// Changing units or budget recomputes revenue.
	pub async fn update_fields(
		&self,
		order_id: &str,
		patch: UpdateOrderRequest,
		actor: &ActorContext,
	) -> Result<Order, LifecycleError> {
		require_staff(actor)?;

		let order = self
			.state_machine
			.update_order_with(order_id, |order| {
				if let Some(units) = patch.units {
					order.units = units;
				}
				if let Some(budget) = patch.budget {
					order.budget = budget;
				}
				order.recompute_revenue();

				if let Some(shipping) = &patch.shipping {
					let s = &mut order.shipping;
					apply(&mut s.company, &shipping.company);
					apply(&mut s.contact_name, &shipping.contact_name);
					apply(&mut s.contact_email, &shipping.contact_email);
					apply(&mut s.address, &shipping.address);
					apply(&mut s.city, &shipping.city);
					apply(&mut s.state, &shipping.state);
					apply(&mut s.zip, &shipping.zip);
					if shipping.requested_delivery.is_some() {
						s.requested_delivery = shipping.requested_delivery;
					}
				}
				if let Some(opportunity) = &patch.opportunity {
					apply_opt(&mut order.account_id, &opportunity.account_id);
					apply_opt(&mut order.quote_id, &opportunity.quote_id);
					apply_opt(&mut order.segment, &opportunity.segment);
					apply_opt(&mut order.manufacturer, &opportunity.manufacturer);
					if let Some(reseller) = opportunity.reseller {
						order.reseller = reseller;
					}
				}
				if let Some(fulfillment) = &patch.fulfillment {
					let f = &mut order.fulfillment;
					apply_opt(&mut f.tracking_number, &fulfillment.tracking_number);
					apply_opt(&mut f.tracking_link, &fulfillment.tracking_link);
					apply_opt(
						&mut f.return_tracking_number,
						&fulfillment.return_tracking_number,
					);
					apply_opt(
						&mut f.return_tracking_link,
						&fulfillment.return_tracking_link,
					);
					apply_opt(&mut f.case_type, &fulfillment.case_type);
					apply_opt(
						&mut f.tracking_credentials,
						&fulfillment.tracking_credentials,
					);
				}
				if patch.demo_expiry_date.is_some() {
					order.demo_expiry_date = patch.demo_expiry_date;
				}
			})
			.await?;
		Ok(order)
	}

	/// Attaches a return-label file reference to an order.
	pub async fn upload_return_label(
		&self,
		order_id: &str,
		file: String,
		actor: &ActorContext,
	) -> Result<Order, LifecycleError> {
		require_staff(actor)?;
		let order = self
			.state_machine
			.update_order_with(order_id, |order| {
				order.fulfillment.return_label = Some(file.clone());
			})
			.await?;
		Ok(order)
	}

	/// Clears the return-label file reference.
	pub async fn remove_return_label(
		&self,
		order_id: &str,
		actor: &ActorContext,
	) -> Result<Order, LifecycleError> {
		require_staff(actor)?;
		let order = self
			.state_machine
			.update_order_with(order_id, |order| {
				order.fulfillment.return_label = None;
			})
			.await?;
		Ok(order)
	}

	/// Gets an order by ID.
	pub async fn get_order(&self, order_id: &str) -> Result<Order, LifecycleError> {
		Ok(self.state_machine.get_order(order_id).await?)
	}

	/// Lists feed notifications, newest first.
	pub async fn list_notifications(&self) -> Result<Vec<Notification>, LifecycleError> {
		let mut notifications: Vec<Notification> = self
			.storage
			.list_all(StorageKey::Notifications.as_str())
			.await?;
		notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
		Ok(notifications)
	}

	/// Marks a feed notification as read.
	pub async fn mark_notification_read(
		&self,
		notification_id: &str,
	) -> Result<Notification, LifecycleError> {
		self.storage
			.mutate(
				StorageKey::Notifications.as_str(),
				notification_id,
				|n: &mut Notification| n.is_read = true,
			)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => LifecycleError::NotFound(format!(
					"Notification not found: {}",
					notification_id
				)),
				other => LifecycleError::Persistence(other.to_string()),
			})
	}

	async fn retrieve_order_versioned(
		&self,
		order_id: &str,
	) -> Result<(Order, Vec<u8>), LifecycleError> {
		self.storage
			.retrieve_versioned(StorageKey::Orders.as_str(), order_id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => {
					LifecycleError::NotFound(format!("Order not found: {}", order_id))
				},
				other => LifecycleError::Persistence(other.to_string()),
			})
	}

	/// Allocates the next sequential order number from the CAS counter.
	async fn next_order_number(&self) -> Result<u64, LifecycleError> {
		for _ in 0..MAX_SWAP_RETRIES {
			match self
				.storage
				.retrieve_versioned::<u64>(StorageKey::Counters.as_str(), ORDER_COUNTER_ID)
				.await
			{
				Ok((current, prior)) => {
					let next = current + 1;
					if self
						.storage
						.replace_versioned(
							StorageKey::Counters.as_str(),
							ORDER_COUNTER_ID,
							&prior,
							&next,
						)
						.await?
					{
						return Ok(next);
					}
				},
				Err(StorageError::NotFound) => {
					if self
						.storage
						.insert_new(StorageKey::Counters.as_str(), ORDER_COUNTER_ID, &1u64)
						.await?
					{
						return Ok(1);
					}
				},
				Err(e) => return Err(e.into()),
			}
		}
		Err(LifecycleError::Persistence(
			"Contention on order number counter".into(),
		))
	}

	/// Appends the notification side effects of a committed transition.
	///
	/// Best-effort: failures are logged and never surface to the caller,
	/// since the status write has already committed.
	async fn fan_out(&self, order: &Order) {
		let Some((user_template, admin_template)) = EmailTemplate::for_status(order.status) else {
			return;
		};
		let payload = mail_payload(order);

		let sends = [
			(user_template, order.shipping.contact_email.as_str(), "user"),
			(admin_template, self.ops_mailbox.as_str(), "admin"),
		];
		for (template, recipient, audience) in sends {
			let dedupe_key = format!("{}:status:{}:{}", order.id, order.status, audience);
			if let Err(e) = outbox::append(
				&self.storage,
				Some(order.id.clone()),
				template,
				recipient,
				dedupe_key,
				payload.clone(),
			)
			.await
			{
				tracing::warn!(
					order_id = %truncate_id(&order.id),
					template = %template,
					error = %e,
					"Failed to append outbox record"
				);
			}
		}

		let notification = Notification {
			id: uuid::Uuid::new_v4().to_string(),
			kind: NotificationKind::Order,
			event: format!("order_{}", order.status),
			reference_id: order.id.clone(),
			is_read: false,
			created_at: unix_now(),
		};
		if let Err(e) = self
			.storage
			.store(
				StorageKey::Notifications.as_str(),
				&notification.id,
				&notification,
			)
			.await
		{
			tracing::warn!(
				order_id = %truncate_id(&order.id),
				error = %e,
				"Failed to store feed notification"
			);
		}
	}
}

/// Rejects subscribers; order edits are staff operations.
pub(crate) fn require_staff(actor: &ActorContext) -> Result<(), LifecycleError> {
	match actor.role {
		Role::Admin | Role::ShopManager | Role::ProgramManager => Ok(()),
		Role::Subscriber => Err(LifecycleError::Forbidden(format!(
			"Role {} may not edit orders",
			actor.role
		))),
	}
}

fn apply(target: &mut String, patch: &Option<String>) {
	if let Some(value) = patch {
		*target = value.clone();
	}
}

fn apply_opt(target: &mut Option<String>, patch: &Option<String>) {
	if patch.is_some() {
		*target = patch.clone();
	}
}

/// Template data captured at append time, so a later resend renders the
/// same text even if the order has moved on.
pub(crate) fn mail_payload(order: &Order) -> serde_json::Value {
	serde_json::json!({
		"order_number": order.order_number,
		"name": order.shipping.contact_name,
		"email": order.shipping.contact_email,
		"tracking_number": order.fulfillment.tracking_number.as_deref().unwrap_or(""),
		"demo_expiry_date": order
			.demo_expiry_date
			.map(|d| d.to_string())
			.unwrap_or_default(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use portal_storage::implementations::memory::MemoryStorage;
	use portal_types::{CartLine, OutboxRecord, ShippingInfo};

	fn actor(role: Role) -> ActorContext {
		ActorContext {
			id: format!("acct-{}", role),
			email: format!("{}@example.com", role),
			role,
		}
	}

	async fn setup() -> (Arc<StorageService>, OrderHandler) {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let product = Product {
			id: "p-1".to_string(),
			name: "Demo Laptop".to_string(),
			sku: "LAP-1".to_string(),
			brand: "Acme".to_string(),
			processor: "X1".to_string(),
			memory: "16GB".to_string(),
			stock_quantity: 10,
		};
		storage
			.store(StorageKey::Products.as_str(), &product.id, &product)
			.await
			.unwrap();
		let state_machine = Arc::new(OrderStateMachine::new(storage.clone()));
		let handler = OrderHandler::new(
			storage.clone(),
			state_machine,
			"orders@example.com".to_string(),
		);
		(storage, handler)
	}

	fn create_request() -> CreateOrderRequest {
		CreateOrderRequest {
			cart: vec![CartLine {
				product_id: "p-1".to_string(),
				quantity: 2,
			}],
			units: 4,
			budget: 250.0,
			shipping: ShippingInfo {
				company: "Acme Corp".to_string(),
				contact_name: "Dana".to_string(),
				contact_email: "dana@example.com".to_string(),
				..Default::default()
			},
			opportunity: Default::default(),
			demo_expiry_date: None,
		}
	}

	#[tokio::test]
	async fn create_order_snapshots_cart_and_numbers_sequentially() {
		let (_storage, handler) = setup().await;
		let subscriber = actor(Role::Subscriber);

		let first = handler
			.create_order(create_request(), &subscriber)
			.await
			.unwrap();
		let second = handler
			.create_order(create_request(), &subscriber)
			.await
			.unwrap();

		assert_eq!(first.order_number, 1);
		assert_eq!(second.order_number, 2);
		assert_eq!(first.status, OrderStatus::Pending);
		assert_eq!(first.revenue, 1000.0);
		assert!(!first.stock_committed);
		assert_eq!(first.line_items.len(), 1);
		assert_eq!(first.line_items[0].sku, "LAP-1");
		assert_eq!(first.line_items[0].quantity, 2);
	}

	#[tokio::test]
	async fn create_order_rejects_empty_cart_and_unknown_products() {
		let (_storage, handler) = setup().await;
		let subscriber = actor(Role::Subscriber);

		let mut request = create_request();
		request.cart.clear();
		assert!(matches!(
			handler.create_order(request, &subscriber).await,
			Err(LifecycleError::Validation(_))
		));

		let mut request = create_request();
		request.cart[0].product_id = "p-missing".to_string();
		assert!(matches!(
			handler.create_order(request, &subscriber).await,
			Err(LifecycleError::Validation(_))
		));
	}

	#[tokio::test]
	async fn approval_stamps_audit_fields_exactly_once() {
		let (_storage, handler) = setup().await;
		let pm = actor(Role::ProgramManager);
		let admin = actor(Role::Admin);

		let order = handler
			.create_order(create_request(), &actor(Role::Subscriber))
			.await
			.unwrap();

		let approved = handler
			.transition_status(&order.id, OrderStatus::Approved, &pm)
			.await
			.unwrap();
		assert_eq!(approved.approved_by.as_deref(), Some(pm.id.as_str()));
		let stamped_at = approved.approved_at.unwrap();

		// A later privileged re-approval must not overwrite the stamp
		handler
			.transition_status(&order.id, OrderStatus::Shipped, &admin)
			.await
			.unwrap();
		let re_approved = handler
			.transition_status(&order.id, OrderStatus::Approved, &admin)
			.await
			.unwrap();
		assert_eq!(re_approved.approved_by.as_deref(), Some(pm.id.as_str()));
		assert_eq!(re_approved.approved_at, Some(stamped_at));
	}

	#[tokio::test]
	async fn policy_forbids_out_of_scope_roles() {
		let (_storage, handler) = setup().await;
		let order = handler
			.create_order(create_request(), &actor(Role::Subscriber))
			.await
			.unwrap();

		assert!(matches!(
			handler
				.transition_status(&order.id, OrderStatus::Approved, &actor(Role::Subscriber))
				.await,
			Err(LifecycleError::Forbidden(_))
		));
		assert!(matches!(
			handler
				.transition_status(&order.id, OrderStatus::Shipped, &actor(Role::ProgramManager))
				.await,
			Err(LifecycleError::Forbidden(_))
		));
	}

	#[tokio::test]
	async fn transitions_fan_out_to_outbox_and_feed() {
		let (storage, handler) = setup().await;
		let order = handler
			.create_order(create_request(), &actor(Role::Subscriber))
			.await
			.unwrap();

		handler
			.transition_status(&order.id, OrderStatus::Approved, &actor(Role::ProgramManager))
			.await
			.unwrap();

		let records: Vec<OutboxRecord> =
			storage.list_all(StorageKey::Outbox.as_str()).await.unwrap();
		assert_eq!(records.len(), 2);
		let recipients: Vec<&str> = records.iter().map(|r| r.recipient.as_str()).collect();
		assert!(recipients.contains(&"dana@example.com"));
		assert!(recipients.contains(&"orders@example.com"));

		let feed = handler.list_notifications().await.unwrap();
		assert_eq!(feed.len(), 1);
		assert_eq!(feed[0].event, "order_approved");
		assert!(!feed[0].is_read);
	}

	#[tokio::test]
	async fn shipped_extension_sends_no_mail() {
		let (storage, handler) = setup().await;
		let admin = actor(Role::Admin);
		let order = handler
			.create_order(create_request(), &actor(Role::Subscriber))
			.await
			.unwrap();

		handler
			.transition_status(&order.id, OrderStatus::ShippedExtension, &admin)
			.await
			.unwrap();

		let records: Vec<OutboxRecord> =
			storage.list_all(StorageKey::Outbox.as_str()).await.unwrap();
		assert!(records.is_empty());
	}

	#[tokio::test]
	async fn update_fields_recomputes_revenue_and_gates_subscribers() {
		let (_storage, handler) = setup().await;
		let order = handler
			.create_order(create_request(), &actor(Role::Subscriber))
			.await
			.unwrap();

		let patch = UpdateOrderRequest {
			units: Some(10),
			..Default::default()
		};
		let updated = handler
			.update_fields(&order.id, patch, &actor(Role::ProgramManager))
			.await
			.unwrap();
		assert_eq!(updated.revenue, 2500.0);

		assert!(matches!(
			handler
				.update_fields(&order.id, Default::default(), &actor(Role::Subscriber))
				.await,
			Err(LifecycleError::Forbidden(_))
		));
	}

	#[tokio::test]
	async fn return_label_round_trip() {
		let (_storage, handler) = setup().await;
		let admin = actor(Role::Admin);
		let order = handler
			.create_order(create_request(), &actor(Role::Subscriber))
			.await
			.unwrap();

		let updated = handler
			.upload_return_label(&order.id, "labels/ord-1.pdf".to_string(), &admin)
			.await
			.unwrap();
		assert_eq!(
			updated.fulfillment.return_label.as_deref(),
			Some("labels/ord-1.pdf")
		);

		let cleared = handler.remove_return_label(&order.id, &admin).await.unwrap();
		assert!(cleared.fulfillment.return_label.is_none());
	}

	#[tokio::test]
	async fn mark_notification_read_flips_flag() {
		let (_storage, handler) = setup().await;
		let order = handler
			.create_order(create_request(), &actor(Role::Subscriber))
			.await
			.unwrap();
		handler
			.transition_status(&order.id, OrderStatus::Rejected, &actor(Role::ProgramManager))
			.await
			.unwrap();

		let feed = handler.list_notifications().await.unwrap();
		let read = handler.mark_notification_read(&feed[0].id).await.unwrap();
		assert!(read.is_read);

		assert!(matches!(
			handler.mark_notification_read("n-missing").await,
			Err(LifecycleError::NotFound(_))
		));
	}
}
