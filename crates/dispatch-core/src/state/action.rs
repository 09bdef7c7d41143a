//! Action state machine.
//!
//! Actions move Pending -> Arrived -> Completed. From Pending or Arrived
//! they may be frozen (reversible, restoring the pre-freeze status on
//! unfreeze), failed or cancelled.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

use dispatch_types::{Action, ActionStatus, StatusHistoryEntry};

use super::StateError;

// Static transition table - each state maps to allowed next states
static TRANSITIONS: Lazy<HashMap<ActionStatus, HashSet<ActionStatus>>> = Lazy::new(|| {
	let mut m = HashMap::new();
	m.insert(
		ActionStatus::Pending,
		HashSet::from([
			ActionStatus::Arrived,
			ActionStatus::Frozen,
			ActionStatus::Failed,
			ActionStatus::Cancelled,
		]),
	);
	m.insert(
		ActionStatus::Arrived,
		HashSet::from([
			ActionStatus::Completed,
			ActionStatus::Frozen,
			ActionStatus::Failed,
			ActionStatus::Cancelled,
		]),
	);
	m.insert(
		ActionStatus::Frozen,
		HashSet::from([ActionStatus::Pending, ActionStatus::Arrived]),
	);
	m.insert(ActionStatus::Completed, HashSet::new()); // terminal
	m.insert(ActionStatus::Failed, HashSet::new()); // terminal
	m.insert(ActionStatus::Cancelled, HashSet::new()); // terminal
	m
});

/// Checks whether a transition is allowed by the table.
pub fn is_valid_transition(from: ActionStatus, to: ActionStatus) -> bool {
	TRANSITIONS.get(&from).is_some_and(|set| set.contains(&to))
}

/// Transitions the action, appending a status-history entry.
pub fn transition(
	action: &mut Action,
	to: ActionStatus,
	note: Option<String>,
) -> Result<(), StateError> {
	if !is_valid_transition(action.status, to) {
		return Err(StateError::InvalidTransition {
			from: action.status.to_string(),
			to: to.to_string(),
		});
	}
	action.status = to;
	action.status_history.push(StatusHistoryEntry::new(to, note));
	Ok(())
}

/// Freezes the action, remembering where to resume.
pub fn freeze(action: &mut Action, reason: Option<String>) -> Result<(), StateError> {
	let from = action.status;
	transition(action, ActionStatus::Frozen, reason)?;
	action.frozen_from = Some(from);
	Ok(())
}

/// Unfreezes the action, restoring the pre-freeze status.
pub fn unfreeze(action: &mut Action) -> Result<(), StateError> {
	let resume = action.frozen_from.unwrap_or(ActionStatus::Pending);
	transition(action, resume, None)?;
	action.frozen_from = None;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use dispatch_types::ActionKind;

	#[test]
	fn pending_cannot_complete_directly() {
		assert!(!is_valid_transition(
			ActionStatus::Pending,
			ActionStatus::Completed
		));
		assert!(is_valid_transition(
			ActionStatus::Arrived,
			ActionStatus::Completed
		));
	}

	#[test]
	fn freeze_and_unfreeze_restore_previous_status() {
		let mut action = Action::new(ActionKind::Pickup);
		action.status = ActionStatus::Arrived;

		freeze(&mut action, Some("driver paused".into())).unwrap();
		assert_eq!(action.status, ActionStatus::Frozen);
		assert_eq!(action.frozen_from, Some(ActionStatus::Arrived));

		unfreeze(&mut action).unwrap();
		assert_eq!(action.status, ActionStatus::Arrived);
		assert!(action.frozen_from.is_none());
	}

	#[test]
	fn unfreezing_a_non_frozen_action_is_rejected() {
		let mut action = Action::new(ActionKind::Pickup);
		assert!(matches!(
			unfreeze(&mut action),
			Err(StateError::InvalidTransition { .. })
		));
	}

	#[test]
	fn terminal_actions_cannot_move() {
		for terminal in [
			ActionStatus::Completed,
			ActionStatus::Failed,
			ActionStatus::Cancelled,
		] {
			assert!(!is_valid_transition(terminal, ActionStatus::Pending));
			assert!(!is_valid_transition(terminal, ActionStatus::Frozen));
		}
	}

	#[test]
	fn history_is_appended_per_transition() {
		let mut action = Action::new(ActionKind::Service);
		transition(&mut action, ActionStatus::Arrived, None).unwrap();
		transition(&mut action, ActionStatus::Completed, Some("done".into())).unwrap();

		let statuses: Vec<&str> = action
			.status_history
			.iter()
			.map(|h| h.status.as_str())
			.collect();
		assert_eq!(statuses, vec!["ARRIVED", "COMPLETED"]);
		assert_eq!(action.status_history[1].note.as_deref(), Some("done"));
	}
}
