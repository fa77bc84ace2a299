//! Order state machine and transition policy.
//!
//! The nominal workflow is pending -> approved | rejected, then
//! approved -> shipped -> return | shipped_extension. The policy table keys
//! permissions on (from, to, role): program managers get exactly the two
//! decision moves out of pending, while admins and shop managers may set any
//! listed status from any current status. Moves outside the nominal graph by
//! a privileged role are allowed but logged.

pub mod order;

pub use order::{OrderStateError, OrderStateMachine};

use once_cell::sync::Lazy;
use portal_types::{OrderStatus, Role};
use std::collections::{HashMap, HashSet};

/// Decision moves available to program managers.
static PROGRAM_MANAGER_TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> =
	Lazy::new(|| {
		HashMap::from([(
			OrderStatus::Pending,
			HashSet::from([OrderStatus::Approved, OrderStatus::Rejected]),
		)])
	});

/// The nominal lifecycle graph. Privileged roles may leave it; doing so is
/// logged by the caller.
static NOMINAL_GRAPH: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
	HashMap::from([
		(
			OrderStatus::Pending,
			HashSet::from([OrderStatus::Approved, OrderStatus::Rejected]),
		),
		(OrderStatus::Approved, HashSet::from([OrderStatus::Shipped])),
		(
			OrderStatus::Shipped,
			HashSet::from([OrderStatus::Return, OrderStatus::ShippedExtension]),
		),
	])
});

/// Checks whether `role` may move an order from `from` to `to`.
pub fn is_transition_allowed(role: Role, from: OrderStatus, to: OrderStatus) -> bool {
	match role {
		Role::Admin | Role::ShopManager => true,
		Role::ProgramManager => PROGRAM_MANAGER_TRANSITIONS
			.get(&from)
			.is_some_and(|set| set.contains(&to)),
		Role::Subscriber => false,
	}
}

/// Checks whether a move follows the nominal lifecycle graph.
pub fn is_nominal_transition(from: OrderStatus, to: OrderStatus) -> bool {
	NOMINAL_GRAPH
		.get(&from)
		.is_some_and(|set| set.contains(&to))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn program_manager_gets_only_pending_decisions() {
		assert!(is_transition_allowed(
			Role::ProgramManager,
			OrderStatus::Pending,
			OrderStatus::Approved
		));
		assert!(is_transition_allowed(
			Role::ProgramManager,
			OrderStatus::Pending,
			OrderStatus::Rejected
		));
		assert!(!is_transition_allowed(
			Role::ProgramManager,
			OrderStatus::Approved,
			OrderStatus::Shipped
		));
		assert!(!is_transition_allowed(
			Role::ProgramManager,
			OrderStatus::Pending,
			OrderStatus::Shipped
		));
	}

	#[test]
	fn privileged_roles_may_set_any_status() {
		for from in OrderStatus::all() {
			for to in OrderStatus::all() {
				assert!(is_transition_allowed(Role::Admin, from, to));
				assert!(is_transition_allowed(Role::ShopManager, from, to));
			}
		}
	}

	#[test]
	fn subscribers_may_transition_nothing() {
		for from in OrderStatus::all() {
			for to in OrderStatus::all() {
				assert!(!is_transition_allowed(Role::Subscriber, from, to));
			}
		}
	}

	#[test]
	fn nominal_graph_matches_workflow() {
		assert!(is_nominal_transition(
			OrderStatus::Pending,
			OrderStatus::Approved
		));
		assert!(is_nominal_transition(
			OrderStatus::Shipped,
			OrderStatus::ShippedExtension
		));
		assert!(!is_nominal_transition(
			OrderStatus::Rejected,
			OrderStatus::Shipped
		));
		assert!(!is_nominal_transition(
			OrderStatus::Shipped,
			OrderStatus::Pending
		));
	}
}
