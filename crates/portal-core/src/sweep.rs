//! Demo-expiry sweep.
//!
//! Walks the order store on an interval and turns demo-loan deadlines into
//! outbox records: a reminder shortly before expiry, an active -> expired
//! flip at the deadline, and escalating overdue notices afterwards. Every
//! send is deduplicated through a persisted (order, kind, date) marker with
//! a TTL, so repeated or concurrent sweeps within a day send nothing twice.

use crate::handlers::order::mail_payload;
use crate::outbox;
use crate::utils::truncate_id;
use chrono::NaiveDate;
use portal_config::SweepConfig;
use portal_storage::{StorageError, StorageService};
use portal_types::{DemoStatus, EmailTemplate, Order, StorageKey};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// How long dedupe markers outlive the day they guard.
const MARK_TTL: Duration = Duration::from_secs(2 * 24 * 60 * 60);

/// Counts of the actions a single sweep pass took.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
	/// Orders scanned.
	pub scanned: usize,
	/// Reminder records appended.
	pub reminders: usize,
	/// Orders flipped from active to expired.
	pub expired: usize,
	/// Overdue escalation records appended.
	pub overdue: usize,
}

/// Periodic task enforcing demo-loan deadlines.
pub struct DemoSweep {
	storage: Arc<StorageService>,
	/// Mailbox receiving overdue escalations.
	ops_mailbox: String,
	config: SweepConfig,
}

impl DemoSweep {
	pub fn new(storage: Arc<StorageService>, ops_mailbox: String, config: SweepConfig) -> Self {
		Self {
			storage,
			ops_mailbox,
			config,
		}
	}

	/// Runs one sweep pass against the given date.
	///
	/// The date is an argument rather than read from the clock so deadline
	/// arithmetic stays deterministic under test.
	#[instrument(skip_all, fields(%today))]
	pub async fn run_once(&self, today: NaiveDate) -> Result<SweepReport, StorageError> {
		let orders: Vec<Order> = self.storage.list_all(StorageKey::Orders.as_str()).await?;
		let mut report = SweepReport::default();

		for order in orders {
			if order.returned_at.is_some() {
				continue;
			}
			let Some(expiry) = order.demo_expiry_date else {
				continue;
			};
			report.scanned += 1;

			match order.demo_status {
				DemoStatus::Active => {
					if today >= expiry {
						self.flip_expired(&order).await;
						report.expired += 1;
					} else if days_until(today, expiry)
						== i64::from(self.config.reminder_days_before)
					{
						if self
							.append_deduped(
								&order,
								"reminder",
								today,
								EmailTemplate::DemoExpiryReminder,
								&order.shipping.contact_email,
							)
							.await
						{
							report.reminders += 1;
						}
					}
				},
				DemoStatus::Expired => {
					let overdue = days_until(expiry, today);
					if overdue > 0
						&& overdue % i64::from(self.config.overdue_step_days) == 0
						&& overdue <= i64::from(self.config.overdue_cap_days)
					{
						if self
							.append_deduped(
								&order,
								"overdue",
								today,
								EmailTemplate::DemoOverdue,
								self.ops_mailbox.as_str(),
							)
							.await
						{
							report.overdue += 1;
						}
					}
				},
			}
		}

		tracing::debug!(
			scanned = report.scanned,
			reminders = report.reminders,
			expired = report.expired,
			overdue = report.overdue,
			"Sweep pass complete"
		);
		Ok(report)
	}

	/// Flips an order to expired, tolerating a concurrent flip.
	async fn flip_expired(&self, order: &Order) {
		let result = self
			.storage
			.mutate(StorageKey::Orders.as_str(), &order.id, |o: &mut Order| {
				o.demo_status = DemoStatus::Expired;
			})
			.await;
		match result {
			Ok(_) => {
				tracing::info!(
					order_id = %truncate_id(&order.id),
					"Demo loan expired"
				);
			},
			Err(e) => {
				tracing::warn!(
					order_id = %truncate_id(&order.id),
					error = %e,
					"Failed to mark demo loan expired"
				);
			},
		}
	}

	/// Appends an outbox record guarded by a one-per-day marker.
	///
	/// Markers carry a TTL so the namespace does not accumulate one key per
	/// order per day forever. Returns true when this sweep was the one that
	/// appended it.
	async fn append_deduped(
		&self,
		order: &Order,
		kind: &str,
		today: NaiveDate,
		template: EmailTemplate,
		recipient: &str,
	) -> bool {
		let mark_id = format!("{}:{}:{}", order.id, kind, today);
		match self
			.storage
			.insert_new_with_ttl(StorageKey::SweepMarks.as_str(), &mark_id, &true, Some(MARK_TTL))
			.await
		{
			Ok(true) => {},
			Ok(false) => return false,
			Err(e) => {
				tracing::warn!(
					order_id = %truncate_id(&order.id),
					kind,
					error = %e,
					"Failed to persist sweep marker"
				);
				return false;
			},
		}

		let mut payload = mail_payload(order);
		if let Some(expiry) = order.demo_expiry_date {
			payload["days_overdue"] = serde_json::json!(days_until(expiry, today).max(0));
		}
		match outbox::append(
			&self.storage,
			Some(order.id.clone()),
			template,
			recipient,
			mark_id,
			payload,
		)
		.await
		{
			Ok(appended) => appended,
			Err(e) => {
				tracing::warn!(
					order_id = %truncate_id(&order.id),
					kind,
					error = %e,
					"Failed to append sweep outbox record"
				);
				false
			},
		}
	}
}

fn days_until(from: NaiveDate, to: NaiveDate) -> i64 {
	(to - from).num_days()
}
