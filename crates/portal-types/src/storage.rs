//! Storage-related types for the portal system.

use std::str::FromStr;

/// Storage namespaces for the portal's data collections.
///
/// This enum provides type safety for storage operations by replacing
/// string literals with strongly typed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Namespace for order records.
	Orders,
	/// Namespace for catalog products.
	Products,
	/// Namespace for account profiles.
	Profiles,
	/// Namespace for UI feed notifications.
	Notifications,
	/// Namespace for pending outbox sends.
	Outbox,
	/// Namespace for sequence counters (order numbers).
	Counters,
	/// Namespace for sweep deduplication markers.
	SweepMarks,
}

impl StorageKey {
	/// Returns the string representation of the storage namespace.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::Products => "products",
			StorageKey::Profiles => "profiles",
			StorageKey::Notifications => "notifications",
			StorageKey::Outbox => "outbox",
			StorageKey::Counters => "counters",
			StorageKey::SweepMarks => "sweep_marks",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Orders,
			Self::Products,
			Self::Profiles,
			Self::Notifications,
			Self::Outbox,
			Self::Counters,
			Self::SweepMarks,
		]
		.into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"orders" => Ok(Self::Orders),
			"products" => Ok(Self::Products),
			"profiles" => Ok(Self::Profiles),
			"notifications" => Ok(Self::Notifications),
			"outbox" => Ok(Self::Outbox),
			"counters" => Ok(Self::Counters),
			"sweep_marks" => Ok(Self::SweepMarks),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}
