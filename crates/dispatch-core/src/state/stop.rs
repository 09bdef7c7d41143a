//! Stop state machine.
//!
//! Stops move Pending -> Arrived -> {Partial, Completed}, and Arrived or
//! Partial may fail. A freeze is a reversible hold flag, not a status:
//! held stops simply refuse lifecycle advances until unfrozen.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

use dispatch_types::{StatusHistoryEntry, Stop, StopStatus};

use super::StateError;

// Static transition table - each state maps to allowed next states
static TRANSITIONS: Lazy<HashMap<StopStatus, HashSet<StopStatus>>> = Lazy::new(|| {
	let mut m = HashMap::new();
	m.insert(StopStatus::Pending, HashSet::from([StopStatus::Arrived]));
	m.insert(
		StopStatus::Arrived,
		HashSet::from([
			StopStatus::Partial,
			StopStatus::Completed,
			StopStatus::Failed,
		]),
	);
	m.insert(StopStatus::Partial, HashSet::from([StopStatus::Failed]));
	m.insert(StopStatus::Completed, HashSet::new()); // terminal
	m.insert(StopStatus::Failed, HashSet::new()); // terminal
	m
});

/// Checks whether a transition is allowed by the table.
pub fn is_valid_transition(from: StopStatus, to: StopStatus) -> bool {
	TRANSITIONS.get(&from).is_some_and(|set| set.contains(&to))
}

/// Transitions the stop, appending a status-history entry.
pub fn transition(stop: &mut Stop, to: StopStatus, note: Option<String>) -> Result<(), StateError> {
	if !is_valid_transition(stop.status, to) {
		return Err(StateError::InvalidTransition {
			from: stop.status.to_string(),
			to: to.to_string(),
		});
	}
	stop.status = to;
	stop.status_history.push(StatusHistoryEntry::new(to, note));
	Ok(())
}

/// Guard for closing out a stop: every action must be resolved.
pub fn ensure_completable(stop: &Stop) -> Result<(), StateError> {
	if stop.on_hold {
		return Err(StateError::GuardViolation(format!(
			"stop {} is held and cannot advance",
			stop.id
		)));
	}
	if !stop.actions_resolved() {
		return Err(StateError::GuardViolation(format!(
			"stop {} still has unresolved actions",
			stop.id
		)));
	}
	Ok(())
}

/// Status a completable stop closes out with: Completed when every
/// action completed, Partial when some were frozen, cancelled or failed.
pub fn close_status(stop: &Stop) -> StopStatus {
	if stop
		.actions
		.iter()
		.all(|a| a.status == dispatch_types::ActionStatus::Completed)
	{
		StopStatus::Completed
	} else {
		StopStatus::Partial
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use dispatch_types::{Action, ActionKind, ActionStatus, Address};

	fn stop_with_action_statuses(statuses: &[ActionStatus]) -> Stop {
		let mut stop = Stop::new(0, Address::default());
		stop.status = StopStatus::Arrived;
		for status in statuses {
			let mut action = Action::new(ActionKind::Service);
			action.status = *status;
			stop.actions.push(action);
		}
		stop
	}

	#[test]
	fn pending_must_arrive_before_closing() {
		assert!(!is_valid_transition(
			StopStatus::Pending,
			StopStatus::Completed
		));
		assert!(!is_valid_transition(StopStatus::Pending, StopStatus::Failed));
		assert!(is_valid_transition(StopStatus::Pending, StopStatus::Arrived));
	}

	#[test]
	fn partial_can_only_fail() {
		assert!(is_valid_transition(StopStatus::Partial, StopStatus::Failed));
		assert!(!is_valid_transition(
			StopStatus::Partial,
			StopStatus::Completed
		));
	}

	#[test]
	fn completion_guard_over_action_status_mixes() {
		let resolved = [
			ActionStatus::Completed,
			ActionStatus::Frozen,
			ActionStatus::Cancelled,
			ActionStatus::Failed,
		];
		let unresolved = [ActionStatus::Pending, ActionStatus::Arrived];

		// Any mix drawn entirely from resolved statuses passes the guard.
		for a in resolved {
			for b in resolved {
				let stop = stop_with_action_statuses(&[a, b]);
				assert!(ensure_completable(&stop).is_ok(), "{:?}/{:?}", a, b);
			}
		}

		// One unresolved action anywhere blocks it.
		for a in resolved {
			for b in unresolved {
				let stop = stop_with_action_statuses(&[a, b]);
				assert!(ensure_completable(&stop).is_err(), "{:?}/{:?}", a, b);
				let stop = stop_with_action_statuses(&[b, a]);
				assert!(ensure_completable(&stop).is_err(), "{:?}/{:?}", b, a);
			}
		}
	}

	#[test]
	fn held_stop_cannot_complete() {
		let mut stop = stop_with_action_statuses(&[ActionStatus::Completed]);
		stop.on_hold = true;
		assert!(matches!(
			ensure_completable(&stop),
			Err(StateError::GuardViolation(_))
		));
	}

	#[test]
	fn close_status_distinguishes_partial() {
		let stop = stop_with_action_statuses(&[ActionStatus::Completed, ActionStatus::Completed]);
		assert_eq!(close_status(&stop), StopStatus::Completed);

		let stop = stop_with_action_statuses(&[ActionStatus::Completed, ActionStatus::Frozen]);
		assert_eq!(close_status(&stop), StopStatus::Partial);
	}
}
