//! Order state machine.
//!
//! Orders move Draft -> Pending -> Accepted -> {Delivered, Failed,
//! Cancelled}; a pending order with no driver engaged may also be
//! cancelled directly.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

use dispatch_types::{Order, OrderStatus, StatusHistoryEntry};

use super::StateError;

// Static transition table - each state maps to allowed next states
static TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
	let mut m = HashMap::new();
	m.insert(OrderStatus::Draft, HashSet::from([OrderStatus::Pending]));
	m.insert(
		OrderStatus::Pending,
		HashSet::from([OrderStatus::Accepted, OrderStatus::Cancelled]),
	);
	m.insert(
		OrderStatus::Accepted,
		HashSet::from([
			OrderStatus::Delivered,
			OrderStatus::Failed,
			OrderStatus::Cancelled,
		]),
	);
	m.insert(OrderStatus::Delivered, HashSet::new()); // terminal
	m.insert(OrderStatus::Failed, HashSet::new()); // terminal
	m.insert(OrderStatus::Cancelled, HashSet::new()); // terminal
	m
});

/// Checks whether a transition is allowed by the table.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
	TRANSITIONS.get(&from).is_some_and(|set| set.contains(&to))
}

/// Transitions the order, appending a status-history entry.
pub fn transition(
	order: &mut Order,
	to: OrderStatus,
	note: Option<String>,
) -> Result<(), StateError> {
	if !is_valid_transition(order.status, to) {
		return Err(StateError::InvalidTransition {
			from: order.status.to_string(),
			to: to.to_string(),
		});
	}
	order.status = to;
	order.status_history.push(StatusHistoryEntry::new(to, note));
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn happy_path_transitions() {
		assert!(is_valid_transition(OrderStatus::Draft, OrderStatus::Pending));
		assert!(is_valid_transition(
			OrderStatus::Pending,
			OrderStatus::Accepted
		));
		assert!(is_valid_transition(
			OrderStatus::Accepted,
			OrderStatus::Delivered
		));
	}

	#[test]
	fn pending_can_cancel_but_draft_cannot() {
		assert!(is_valid_transition(
			OrderStatus::Pending,
			OrderStatus::Cancelled
		));
		assert!(!is_valid_transition(
			OrderStatus::Draft,
			OrderStatus::Cancelled
		));
	}

	#[test]
	fn terminal_states_are_dead_ends() {
		for terminal in [
			OrderStatus::Delivered,
			OrderStatus::Failed,
			OrderStatus::Cancelled,
		] {
			for to in [
				OrderStatus::Draft,
				OrderStatus::Pending,
				OrderStatus::Accepted,
				OrderStatus::Delivered,
			] {
				assert!(!is_valid_transition(terminal, to));
			}
		}
	}

	#[test]
	fn draft_cannot_skip_to_accepted() {
		assert!(!is_valid_transition(
			OrderStatus::Draft,
			OrderStatus::Accepted
		));
	}
}
