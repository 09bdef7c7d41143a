//! Applies a staged overlay to the authoritative execution record.
//!
//! For every entity carrying a staging marker, one create, replace or
//! delete is applied against the record. The whole batch lands on an
//! in-memory copy of the record, so persisting the result is a single
//! write and a half-applied tree can never be observed. Edits whose
//! target no longer accepts them (missing, or already terminal on the
//! execution side) are dropped and enumerated as conflicts; the rest of
//! the batch still applies.

use dispatch_types::{
	Action, ActionStatus, Address, ConfirmationRule, Order, PushConflict, Step, Stop, StopStatus,
};

use crate::overlay::Overlay;

/// Result of applying one overlay batch to a record.
#[derive(Debug, Default)]
pub struct PushOutcome {
	/// Number of create/replace/delete operations applied.
	pub applied: usize,
	/// Edits dropped because their target was gone or closed out.
	pub conflicts: Vec<PushConflict>,
	/// True when any stop address was created, changed or removed.
	pub address_changed: bool,
	/// Record entity ids that no longer exist after the batch
	/// (deleted entities and replaced originals).
	pub removed_entity_ids: Vec<String>,
}

impl PushOutcome {
	fn conflict(&mut self, entity_id: &str, target_id: Option<&str>, reason: &str) {
		self.conflicts.push(PushConflict {
			entity_id: entity_id.to_string(),
			target_id: target_id.map(|t| t.to_string()),
			reason: reason.to_string(),
		});
	}
}

/// Applies the overlay's staged edits to `record` in place.
///
/// The caller owns persistence and idempotency: this function assumes
/// the batch has not been applied yet.
pub fn apply_overlay(record: &mut Order, overlay: &Overlay) -> PushOutcome {
	let mut outcome = PushOutcome::default();

	for o_step in &overlay.steps {
		let rec_step_id = resolve_step(record, overlay, o_step, &mut outcome);

		for o_stop in &o_step.stops {
			if o_stop.delete_required {
				delete_stop(record, o_stop, &mut outcome);
			} else if let Some(orig) = &o_stop.original_id {
				// When the replace is dropped, child edits still target
				// the surviving original so each one applies or surfaces
				// its own conflict.
				let target = if replace_stop(record, o_stop, orig, &mut outcome) {
					o_stop.id.clone()
				} else {
					orig.clone()
				};
				sync_actions(record, &target, &o_stop.actions, overlay, &mut outcome);
			} else if overlay.is_base(&o_stop.id) {
				sync_actions(record, &o_stop.id, &o_stop.actions, overlay, &mut outcome);
			} else {
				create_stop(record, &rec_step_id, o_stop, &mut outcome);
			}
		}
	}

	adopt_new_items(record, overlay);

	// Deletions may have emptied a step; childless steps are pruned and
	// sequences re-packed so linked steps stay contiguous.
	for step in &record.steps {
		if step.stops.is_empty() {
			outcome.removed_entity_ids.push(step.id.clone());
		}
	}
	record.steps.retain(|s| !s.stops.is_empty());
	record.resequence();
	record.last_push_batch = Some(overlay.batch_id.clone());
	record.updated_at = chrono::Utc::now();

	outcome
}

/// Resolves the record step an overlay step targets, applying the
/// step-level op on the way.
///
/// Always returns the id child creates should target; when the target
/// step is gone the creates will surface their own conflicts against it.
fn resolve_step(
	record: &mut Order,
	overlay: &Overlay,
	o_step: &Step,
	outcome: &mut PushOutcome,
) -> String {
	if let Some(orig) = &o_step.original_id {
		// Replace: the shadow's identity and settings become
		// authoritative; the stops are reconciled child by child.
		match record.step_mut(orig) {
			Some(step) => {
				step.id = o_step.id.clone();
				step.linked = o_step.linked;
				step.pending_change = false;
				step.original_id = None;
				outcome.applied += 1;
				outcome.removed_entity_ids.push(orig.clone());
				o_step.id.clone()
			},
			None => {
				outcome.conflict(&o_step.id, Some(orig), "step no longer exists");
				orig.clone()
			},
		}
	} else if overlay.is_base(&o_step.id) {
		o_step.id.clone()
	} else {
		// Create: a step staged by the office, empty for now; its stops
		// follow as creates.
		let mut step = Step::new(record.steps.len() as u32, o_step.linked);
		step.id = o_step.id.clone();
		record.steps.push(step);
		outcome.applied += 1;
		o_step.id.clone()
	}
}

fn addresses_differ(a: &Address, b: &Address) -> bool {
	a.lat != b.lat || a.lng != b.lng || a.formatted_address != b.formatted_address
}

fn delete_stop(record: &mut Order, o_stop: &Stop, outcome: &mut PushOutcome) {
	let target = o_stop.original_id.as_deref().unwrap_or(&o_stop.id);

	let Some(existing) = record.stop(target) else {
		outcome.conflict(&o_stop.id, Some(target), "stop already removed");
		return;
	};
	if existing.status.is_terminal() {
		outcome.conflict(&o_stop.id, Some(target), "stop already completed by the field");
		return;
	}

	for step in record.steps.iter_mut() {
		if let Some(idx) = step.stops.iter().position(|s| s.id == target) {
			let removed = step.stops.remove(idx);
			outcome.removed_entity_ids.push(removed.id);
			outcome
				.removed_entity_ids
				.extend(removed.actions.into_iter().map(|a| a.id));
			break;
		}
	}
	outcome.address_changed = true;
	outcome.applied += 1;
}

/// Replaces an execution-side stop with its staged shadow, preserving
/// the execution state the office must not rewind.
fn replace_stop(
	record: &mut Order,
	o_stop: &Stop,
	orig: &str,
	outcome: &mut PushOutcome,
) -> bool {
	let Some(stop) = record.stop_mut(orig) else {
		outcome.conflict(&o_stop.id, Some(orig), "stop no longer exists");
		return false;
	};
	if stop.status.is_terminal() {
		outcome.conflict(&o_stop.id, Some(orig), "stop already completed by the field");
		return false;
	}

	if addresses_differ(&stop.address, &o_stop.address) {
		outcome.address_changed = true;
	}

	stop.id = o_stop.id.clone();
	stop.address = o_stop.address.clone();
	stop.client = o_stop.client.clone();
	stop.arrival_window_start = o_stop.arrival_window_start;
	stop.arrival_window_end = o_stop.arrival_window_end;
	stop.pending_change = false;
	stop.delete_required = false;
	stop.original_id = None;

	outcome.removed_entity_ids.push(orig.to_string());
	outcome.applied += 1;
	true
}

fn create_stop(record: &mut Order, step_id: &str, o_stop: &Stop, outcome: &mut PushOutcome) {
	let Some(step) = record.step_mut(step_id) else {
		outcome.conflict(&o_stop.id, Some(step_id), "parent step no longer exists");
		return;
	};

	let mut stop = o_stop.clone();
	stop.status = StopStatus::Pending;
	stop.on_hold = false;
	stop.hold_reason = None;
	stop.status_history = Vec::new();
	stop.pending_change = false;
	stop.delete_required = false;
	stop.original_id = None;
	for action in stop.actions.iter_mut() {
		scrub_created_action(action);
	}

	outcome.applied += 1 + stop.actions.len();
	outcome.address_changed = true;
	step.stops.push(stop);
}

fn scrub_created_action(action: &mut Action) {
	action.status = ActionStatus::Pending;
	action.frozen_from = None;
	action.status_history = Vec::new();
	action.pending_change = false;
	action.delete_required = false;
	action.original_id = None;
}

/// Reconciles the actions of a stop that exists on both sides.
fn sync_actions(
	record: &mut Order,
	stop_id: &str,
	o_actions: &[Action],
	overlay: &Overlay,
	outcome: &mut PushOutcome,
) {
	for o_action in o_actions {
		if o_action.delete_required {
			delete_action(record, stop_id, o_action, outcome);
		} else if let Some(orig) = o_action.original_id.clone() {
			replace_action(record, o_action, &orig, outcome);
		} else if !overlay.is_base(&o_action.id) {
			let Some(stop) = record.stop_mut(stop_id) else {
				outcome.conflict(&o_action.id, Some(stop_id), "parent stop no longer exists");
				continue;
			};
			let mut action = o_action.clone();
			scrub_created_action(&mut action);
			stop.actions.push(action);
			outcome.applied += 1;
		}
	}
}

fn delete_action(
	record: &mut Order,
	stop_id: &str,
	o_action: &Action,
	outcome: &mut PushOutcome,
) {
	let target = o_action.original_id.as_deref().unwrap_or(&o_action.id);

	let Some(stop) = record.stop_mut(stop_id) else {
		outcome.conflict(&o_action.id, Some(stop_id), "parent stop no longer exists");
		return;
	};
	let Some(idx) = stop.actions.iter().position(|a| a.id == target) else {
		outcome.conflict(&o_action.id, Some(target), "action already removed");
		return;
	};
	if stop.actions[idx].status.is_terminal() {
		outcome.conflict(&o_action.id, Some(target), "action already completed by the field");
		return;
	}

	let removed = stop.actions.remove(idx);
	outcome.removed_entity_ids.push(removed.id);
	outcome.applied += 1;
}

fn replace_action(record: &mut Order, o_action: &Action, orig: &str, outcome: &mut PushOutcome) {
	let Some(action) = record.action_mut(orig) else {
		outcome.conflict(&o_action.id, Some(orig), "action no longer exists");
		return;
	};
	if action.status.is_terminal() {
		outcome.conflict(&o_action.id, Some(orig), "action already completed by the field");
		return;
	}

	// Proof references captured in the field survive a rule rewrite.
	let mut rules = o_action.confirmation_rules.clone();
	carry_references(&action.confirmation_rules.photo, &mut rules.photo);
	carry_references(&action.confirmation_rules.code, &mut rules.code);

	action.id = o_action.id.clone();
	action.kind = o_action.kind;
	action.transit_item_id = o_action.transit_item_id.clone();
	action.quantity = o_action.quantity;
	action.service_time = o_action.service_time;
	action.confirmation_rules = rules;
	action.pending_change = false;
	action.delete_required = false;
	action.original_id = None;

	outcome.removed_entity_ids.push(orig.to_string());
	outcome.applied += 1;
}

fn carry_references(old: &[ConfirmationRule], new: &mut [ConfirmationRule]) {
	for rule in new.iter_mut() {
		if rule.reference.is_none() {
			if let Some(prev) = old.iter().find(|r| r.name == rule.name) {
				rule.reference = prev.reference.clone();
			}
		}
	}
}

/// Appends overlay-created transit items that made it into the record.
fn adopt_new_items(record: &mut Order, overlay: &Overlay) {
	for item in &overlay.new_items {
		let referenced = record
			.actions()
			.any(|a| a.transit_item_id.as_deref() == Some(&item.id));
		let known = record.transit_items.iter().any(|i| i.id == item.id);
		if referenced && !known {
			record.transit_items.push(item.clone());
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::overlay::Overlay;
	use chrono::Utc;
	use dispatch_types::{
		ids, ActionKind, Address, AssignmentMode, EditOp, OrderStatus, StopPatch,
	};

	fn record_with_stops(n: usize) -> Order {
		let mut step = Step::new(0, false);
		for i in 0..n {
			let mut stop = Stop::new(
				i as u32,
				Address {
					formatted_address: Some(format!("addr {}", i)),
					lat: Some(5.0 + i as f64),
					lng: Some(-4.0),
					..Address::default()
				},
			);
			stop.actions.push(Action::new(ActionKind::Service));
			step.stops.push(stop);
		}

		Order {
			id: ids::order_id(),
			ref_id: None,
			assignment_mode: AssignmentMode::Global,
			driver_id: None,
			status: OrderStatus::Pending,
			steps: vec![step],
			transit_items: Vec::new(),
			route: None,
			status_history: Vec::new(),
			last_push_batch: None,
			created_at: Utc::now(),
			updated_at: Utc::now(),
		}
	}

	#[test]
	fn empty_overlay_applies_nothing() {
		let mut record = record_with_stops(2);
		let overlay = Overlay::from_order(&record);
		let before = serde_json::to_value(&record.steps).unwrap();

		let outcome = apply_overlay(&mut record, &overlay);

		assert_eq!(outcome.applied, 0);
		assert!(outcome.conflicts.is_empty());
		assert!(!outcome.address_changed);
		assert_eq!(serde_json::to_value(&record.steps).unwrap(), before);
	}

	#[test]
	fn delete_required_stop_is_removed() {
		let mut record = record_with_stops(3);
		let doomed = record.steps[0].stops[2].id.clone();
		let mut overlay = Overlay::from_order(&record);
		overlay
			.apply(EditOp::Remove {
				entity_id: doomed.clone(),
			})
			.unwrap();

		let outcome = apply_overlay(&mut record, &overlay);

		assert_eq!(outcome.applied, 1);
		assert!(outcome.conflicts.is_empty());
		assert!(outcome.address_changed);
		assert!(record.stop(&doomed).is_none());
		assert!(outcome.removed_entity_ids.contains(&doomed));
		// Sequences re-packed after the deletion.
		let seqs: Vec<u32> = record.steps[0].stops.iter().map(|s| s.sequence).collect();
		assert_eq!(seqs, vec![0, 1]);
	}

	#[test]
	fn replace_preserves_execution_state() {
		let mut record = record_with_stops(2);
		let target = record.steps[0].stops[0].id.clone();
		record.stop_mut(&target).unwrap().status = dispatch_types::StopStatus::Arrived;

		let mut overlay = Overlay::from_order(&record);
		overlay
			.apply(EditOp::ModifyStop {
				stop_id: target.clone(),
				patch: StopPatch {
					address: Some(Address {
						formatted_address: Some("relocated".into()),
						lat: Some(9.0),
						lng: Some(9.0),
						..Address::default()
					}),
					..StopPatch::default()
				},
			})
			.unwrap();
		let shadow_id = overlay.steps[0].stops[0].id.clone();

		let outcome = apply_overlay(&mut record, &overlay);

		assert_eq!(outcome.applied, 1);
		assert!(outcome.address_changed);
		assert!(record.stop(&target).is_none());
		let replaced = record.stop(&shadow_id).unwrap();
		assert_eq!(replaced.status, dispatch_types::StopStatus::Arrived);
		assert_eq!(replaced.address.formatted_address.as_deref(), Some("relocated"));
		assert!(!replaced.pending_change);
		assert!(replaced.original_id.is_none());
	}

	#[test]
	fn edit_against_completed_stop_conflicts_but_batch_applies() {
		let mut record = record_with_stops(2);
		let completed = record.steps[0].stops[0].id.clone();
		let deletable = record.steps[0].stops[1].id.clone();

		let mut overlay = Overlay::from_order(&record);
		overlay
			.apply(EditOp::ModifyStop {
				stop_id: completed.clone(),
				patch: StopPatch::default(),
			})
			.unwrap();
		overlay
			.apply(EditOp::Remove {
				entity_id: deletable.clone(),
			})
			.unwrap();

		// Field closes the first stop before the push lands.
		record.stop_mut(&completed).unwrap().status = dispatch_types::StopStatus::Completed;

		let outcome = apply_overlay(&mut record, &overlay);

		assert_eq!(outcome.conflicts.len(), 1);
		assert_eq!(
			outcome.conflicts[0].target_id.as_deref(),
			Some(completed.as_str())
		);
		// The rest of the batch still applied.
		assert_eq!(outcome.applied, 1);
		assert!(record.stop(&deletable).is_none());
		// The conflicting edit was dropped: the original survives.
		assert!(record.stop(&completed).is_some());
	}

	#[test]
	fn added_step_with_stop_lands_and_empty_steps_prune() {
		let mut record = record_with_stops(1);
		let only_stop = record.steps[0].stops[0].id.clone();

		let mut overlay = Overlay::from_order(&record);
		overlay.apply(EditOp::AddStep { linked: true }).unwrap();
		let new_step_id = overlay.steps[1].id.clone();
		overlay
			.apply(EditOp::AddStop {
				step_id: new_step_id.clone(),
				stop: dispatch_types::DraftStop {
					address: Address {
						formatted_address: Some("new".into()),
						lat: Some(1.0),
						lng: Some(1.0),
						..Address::default()
					},
					client: None,
					arrival_window_start: None,
					arrival_window_end: None,
					actions: vec![dispatch_types::DraftAction {
						kind: ActionKind::Service,
						item: None,
						item_ref: None,
						quantity: 1,
						service_time: 30,
						confirmation_rules: Default::default(),
					}],
				},
			})
			.unwrap();
		overlay
			.apply(EditOp::Remove {
				entity_id: only_stop,
			})
			.unwrap();

		let outcome = apply_overlay(&mut record, &overlay);

		// step create + stop create + action create + stop delete
		assert_eq!(outcome.applied, 4);
		assert!(outcome.conflicts.is_empty());
		// The emptied original step was pruned.
		assert_eq!(record.steps.len(), 1);
		assert_eq!(record.steps[0].id, new_step_id);
		assert_eq!(record.steps[0].sequence, 0);
	}

	#[test]
	fn staged_pickup_brings_its_transit_item() {
		let mut record = record_with_stops(1);
		let stop_id = record.steps[0].stops[0].id.clone();

		let mut overlay = Overlay::from_order(&record);
		overlay
			.apply(EditOp::AddAction {
				stop_id,
				action: dispatch_types::DraftAction {
					kind: ActionKind::Pickup,
					item: Some(dispatch_types::DraftTransitItem {
						local_key: "crate-1".into(),
						item: dispatch_types::TransitItemSpec {
							name: "Crate".into(),
							description: None,
							packaging: None,
							weight_g: None,
							volume_l: None,
							dimensions: None,
							unitary_price: None,
							requirements: vec![],
							product_types: vec![],
						},
					}),
					item_ref: None,
					quantity: 1,
					service_time: 0,
					confirmation_rules: Default::default(),
				},
			})
			.unwrap();

		let outcome = apply_overlay(&mut record, &overlay);

		assert_eq!(outcome.applied, 1);
		assert_eq!(record.transit_items.len(), 1);
		assert_eq!(record.transit_items[0].name, "Crate");
		let pickup = record
			.actions()
			.find(|a| a.kind == ActionKind::Pickup)
			.unwrap();
		assert_eq!(
			pickup.transit_item_id.as_deref(),
			Some(record.transit_items[0].id.as_str())
		);
	}
}
