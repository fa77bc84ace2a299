//! Notification outbox.
//!
//! Status transitions and the expiry sweep never send email inline. They
//! append an [`OutboxRecord`] next to the state change; the worker here
//! drains the namespace on an interval, delivering each record at least once.
//! A record's id doubles as its dedupe key, so re-appending the same send
//! while one is still pending is a no-op.

use crate::utils::{truncate_id, unix_now};
use portal_notify::NotifierService;
use portal_storage::{StorageError, StorageService};
use portal_types::{EmailTemplate, OutboxRecord, StorageKey};
use std::sync::Arc;

/// Appends an outbox record, deduplicated on its key.
///
/// Returns false when a record with the same dedupe key is already pending.
pub async fn append(
	storage: &StorageService,
	order_id: Option<String>,
	template: EmailTemplate,
	recipient: &str,
	dedupe_key: String,
	payload: serde_json::Value,
) -> Result<bool, StorageError> {
	let record = OutboxRecord {
		id: dedupe_key.clone(),
		order_id,
		template,
		recipient: recipient.to_string(),
		dedupe_key,
		payload,
		attempts: 0,
		created_at: unix_now(),
	};
	storage
		.insert_new(StorageKey::Outbox.as_str(), &record.id, &record)
		.await
}

/// Interval-driven worker that drains pending outbox records.
pub struct OutboxWorker {
	storage: Arc<StorageService>,
	notifier: Arc<NotifierService>,
	/// Delivery attempts per record before it is parked.
	max_attempts: u32,
}

impl OutboxWorker {
	pub fn new(storage: Arc<StorageService>, notifier: Arc<NotifierService>, max_attempts: u32) -> Self {
		Self {
			storage,
			notifier,
			max_attempts,
		}
	}

	/// Drains the outbox once, returning the number of records delivered.
	///
	/// Successful sends delete the record; failures increment `attempts` and
	/// leave it for the next drain. Records at the attempt cap are parked and
	/// skipped.
	pub async fn run_once(&self) -> Result<usize, StorageError> {
		let records: Vec<OutboxRecord> = self.storage.list_all(StorageKey::Outbox.as_str()).await?;
		let mut delivered = 0;

		for record in records {
			if record.attempts >= self.max_attempts {
				continue;
			}

			match self
				.notifier
				.send(record.template, &record.recipient, &record.payload)
				.await
			{
				Ok(()) => {
					self.storage
						.remove(StorageKey::Outbox.as_str(), &record.id)
						.await?;
					delivered += 1;
					tracing::debug!(
						template = %record.template,
						record_id = %truncate_id(&record.id),
						"Outbox record delivered"
					);
				},
				Err(e) => {
					let attempts = record.attempts + 1;
					if attempts >= self.max_attempts {
						tracing::warn!(
							template = %record.template,
							record_id = %truncate_id(&record.id),
							attempts = attempts,
							error = %e,
							"Outbox record reached attempt cap, parking"
						);
					} else {
						tracing::debug!(
							template = %record.template,
							record_id = %truncate_id(&record.id),
							attempts = attempts,
							error = %e,
							"Outbox delivery failed, will retry"
						);
					}
					// Record may have been delivered and removed by a
					// concurrent drain; a missing record is fine.
					match self
						.storage
						.mutate(
							StorageKey::Outbox.as_str(),
							&record.id,
							|r: &mut OutboxRecord| r.attempts += 1,
						)
						.await
					{
						Ok(_) | Err(StorageError::NotFound) => {},
						Err(e) => return Err(e),
					}
				},
			}
		}

		Ok(delivered)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use portal_notify::{NotifierInterface, NotifyError};
	use portal_storage::implementations::memory::MemoryStorage;
	use portal_types::{ConfigSchema, EmailMessage};
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct FlakyNotifier {
		failures_left: AtomicUsize,
	}

	#[async_trait]
	impl NotifierInterface for FlakyNotifier {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			unimplemented!("not exercised in tests")
		}

		async fn send(&self, _from: &str, _message: &EmailMessage) -> Result<(), NotifyError> {
			if self
				.failures_left
				.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
				.is_ok()
			{
				Err(NotifyError::Network("connection reset".into()))
			} else {
				Ok(())
			}
		}
	}

	fn setup(failures: usize) -> (Arc<StorageService>, OutboxWorker) {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let notifier = Arc::new(NotifierService::new(
			Box::new(FlakyNotifier {
				failures_left: AtomicUsize::new(failures),
			}),
			"portal@example.com".to_string(),
		));
		let worker = OutboxWorker::new(storage.clone(), notifier, 3);
		(storage, worker)
	}

	#[tokio::test]
	async fn delivers_and_deletes() {
		let (storage, worker) = setup(0);
		append(
			&storage,
			Some("o-1".into()),
			EmailTemplate::OrderApprovedUser,
			"buyer@example.com",
			"o-1:status:approved:user".into(),
			serde_json::json!({ "order_number": 1 }),
		)
		.await
		.unwrap();

		assert_eq!(worker.run_once().await.unwrap(), 1);
		let remaining: Vec<OutboxRecord> =
			storage.list_all(StorageKey::Outbox.as_str()).await.unwrap();
		assert!(remaining.is_empty());
	}

	#[tokio::test]
	async fn append_dedupes_on_key() {
		let (storage, _worker) = setup(0);
		let key = "o-1:status:approved:user".to_string();
		assert!(append(
			&storage,
			Some("o-1".into()),
			EmailTemplate::OrderApprovedUser,
			"buyer@example.com",
			key.clone(),
			serde_json::json!({}),
		)
		.await
		.unwrap());
		assert!(!append(
			&storage,
			Some("o-1".into()),
			EmailTemplate::OrderApprovedUser,
			"buyer@example.com",
			key,
			serde_json::json!({}),
		)
		.await
		.unwrap());
	}

	#[tokio::test]
	async fn failures_increment_attempts_then_park() {
		let (storage, worker) = setup(usize::MAX);
		append(
			&storage,
			None,
			EmailTemplate::DemoOverdue,
			"orders@example.com",
			"o-2:overdue:2025-06-10".into(),
			serde_json::json!({}),
		)
		.await
		.unwrap();

		for _ in 0..4 {
			assert_eq!(worker.run_once().await.unwrap(), 0);
		}
		let records: Vec<OutboxRecord> =
			storage.list_all(StorageKey::Outbox.as_str()).await.unwrap();
		assert_eq!(records.len(), 1);
		// Parked at the cap, not incremented further
		assert_eq!(records[0].attempts, 3);
	}
}
