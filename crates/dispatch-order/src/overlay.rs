//! Pending-change overlay for in-flight orders.
//!
//! Once an order is past `Draft`, structural edits no longer touch the
//! authoritative execution record. They are staged here, against a
//! snapshot of the hierarchy taken at the first edit:
//!
//! - additions get fresh local ids and `pendingChange` markers,
//! - modifying an execution-side entity creates a shadow copy carrying
//!   `originalId`, leaving the original diffable until push confirms the
//!   replacement,
//! - removing an execution-side entity marks it `isDeleteRequired`, while
//!   removing a purely local addition discards it outright.
//!
//! The overlay never mutates execution status: edit operations carry no
//! status fields by construction, and status flows only from the field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use dispatch_types::{
	ids, Action, ActionKind, DraftAction, DraftStop, EditOp, Order, Step, Stop, TransitItem,
};

use crate::OverlayError;

/// Staged edits for one in-flight order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overlay {
	pub order_id: String,
	/// Idempotency key for the next push batch.
	pub batch_id: String,
	/// Ids of entities (and transit items) present in the execution
	/// record when this overlay was created.
	pub base_ids: HashSet<String>,
	/// Local item key -> hoisted item id, for cross-edit references.
	#[serde(default)]
	pub item_keys: HashMap<String, String>,
	/// Transit items introduced by staged pickup actions.
	#[serde(default)]
	pub new_items: Vec<TransitItem>,
	/// The staged hierarchy.
	pub steps: Vec<Step>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Overlay {
	/// Snapshots the execution record as the staging baseline.
	pub fn from_order(order: &Order) -> Self {
		let mut base_ids = HashSet::new();
		for step in &order.steps {
			base_ids.insert(step.id.clone());
			for stop in &step.stops {
				base_ids.insert(stop.id.clone());
				for action in &stop.actions {
					base_ids.insert(action.id.clone());
				}
			}
		}
		for item in &order.transit_items {
			base_ids.insert(item.id.clone());
		}

		let now = Utc::now();
		Self {
			order_id: order.id.clone(),
			batch_id: ids::batch_id(),
			base_ids,
			item_keys: HashMap::new(),
			new_items: Vec::new(),
			steps: order.steps.clone(),
			created_at: now,
			updated_at: now,
		}
	}

	/// Returns true when any staged marker is present.
	pub fn has_changes(&self) -> bool {
		self.steps.iter().any(|step| {
			step.pending_change
				|| step.original_id.is_some()
				|| step.stops.iter().any(|stop| {
					stop.pending_change
						|| stop.delete_required
						|| stop.original_id.is_some()
						|| stop.actions.iter().any(|a| {
							a.pending_change || a.delete_required || a.original_id.is_some()
						})
				})
		})
	}

	/// Returns true when the given id belonged to the execution record
	/// at snapshot time.
	pub fn is_base(&self, id: &str) -> bool {
		self.base_ids.contains(id)
	}

	/// Applies one staged edit operation.
	pub fn apply(&mut self, op: EditOp) -> Result<(), OverlayError> {
		match op {
			EditOp::AddStep { linked } => {
				let mut step = Step::new(self.steps.len() as u32, linked);
				step.pending_change = true;
				self.steps.push(step);
			},
			EditOp::AddStop { step_id, stop } => {
				let new_stop = self.build_stop(stop)?;
				let step = self
					.steps
					.iter_mut()
					.find(|s| s.id == step_id)
					.ok_or_else(|| OverlayError::NotFound(step_id))?;
				step.pending_change = true;
				step.stops.push(new_stop);
			},
			EditOp::AddAction { stop_id, action } => {
				let new_action = self.build_action(action)?;
				let (si, pi) = self
					.locate_stop(&stop_id)
					.ok_or_else(|| OverlayError::NotFound(stop_id))?;
				let step = &mut self.steps[si];
				step.pending_change = true;
				let stop = &mut step.stops[pi];
				stop.pending_change = true;
				stop.actions.push(new_action);
			},
			EditOp::ModifyStep { step_id, patch } => {
				let is_base = self.base_ids.contains(&step_id);
				let step = self
					.steps
					.iter_mut()
					.find(|s| s.id == step_id)
					.ok_or_else(|| OverlayError::NotFound(step_id))?;
				if is_base && step.original_id.is_none() {
					step.original_id = Some(step.id.clone());
					step.id = ids::step_id();
				}
				if let Some(linked) = patch.linked {
					step.linked = linked;
				}
				step.pending_change = true;
			},
			EditOp::ModifyStop { stop_id, patch } => {
				let is_base = self.base_ids.contains(&stop_id);
				let (si, pi) = self
					.locate_stop(&stop_id)
					.ok_or_else(|| OverlayError::NotFound(stop_id))?;
				let step = &mut self.steps[si];
				step.pending_change = true;
				let stop = &mut step.stops[pi];
				if is_base && stop.original_id.is_none() {
					stop.original_id = Some(stop.id.clone());
					stop.id = ids::stop_id();
				}
				if let Some(address) = patch.address {
					stop.address = address;
				}
				if let Some(client) = patch.client {
					stop.client = Some(client);
				}
				if let Some(start) = patch.arrival_window_start {
					stop.arrival_window_start = Some(start);
				}
				if let Some(end) = patch.arrival_window_end {
					stop.arrival_window_end = Some(end);
				}
				stop.pending_change = true;
			},
			EditOp::ModifyAction { action_id, patch } => {
				let is_base = self.base_ids.contains(&action_id);
				let (si, pi, ai) = self
					.locate_action(&action_id)
					.ok_or_else(|| OverlayError::NotFound(action_id))?;
				let step = &mut self.steps[si];
				step.pending_change = true;
				let stop = &mut step.stops[pi];
				stop.pending_change = true;
				let action = &mut stop.actions[ai];
				if is_base && action.original_id.is_none() {
					action.original_id = Some(action.id.clone());
					action.id = ids::action_id();
				}
				if let Some(quantity) = patch.quantity {
					action.quantity = quantity;
				}
				if let Some(service_time) = patch.service_time {
					action.service_time = service_time;
				}
				if let Some(rules) = patch.confirmation_rules {
					action.confirmation_rules = rules;
				}
				action.pending_change = true;
			},
			EditOp::Remove { entity_id } => {
				self.remove(&entity_id)?;
			},
		}

		self.resequence();
		self.updated_at = Utc::now();
		Ok(())
	}

	/// Produces the office view: the staged hierarchy with execution
	/// status refreshed from the authoritative record.
	pub fn merge_into(&self, record: &Order) -> Order {
		let mut merged = record.clone();
		let mut steps = self.steps.clone();

		for step in &mut steps {
			for stop in &mut step.stops {
				let target = stop.original_id.clone().unwrap_or_else(|| stop.id.clone());
				if let Some(rec) = record.stop(&target) {
					stop.status = rec.status;
					stop.on_hold = rec.on_hold;
					stop.hold_reason = rec.hold_reason.clone();
					stop.status_history = rec.status_history.clone();
				}
				for action in &mut stop.actions {
					let target = action
						.original_id
						.clone()
						.unwrap_or_else(|| action.id.clone());
					if let Some(rec) = record.action(&target) {
						action.status = rec.status;
						action.frozen_from = rec.frozen_from;
						action.status_history = rec.status_history.clone();
					}
				}
			}
		}

		merged.steps = steps;
		merged.transit_items.extend(self.new_items.iter().cloned());
		merged
	}

	fn locate_stop(&self, stop_id: &str) -> Option<(usize, usize)> {
		self.steps.iter().enumerate().find_map(|(si, step)| {
			step.stops
				.iter()
				.position(|s| s.id == stop_id)
				.map(|pi| (si, pi))
		})
	}

	fn locate_action(&self, action_id: &str) -> Option<(usize, usize, usize)> {
		self.steps.iter().enumerate().find_map(|(si, step)| {
			step.stops.iter().enumerate().find_map(|(pi, stop)| {
				stop.actions
					.iter()
					.position(|a| a.id == action_id)
					.map(|ai| (si, pi, ai))
			})
		})
	}

	/// Materializes a staged stop, hoisting inline transit items.
	fn build_stop(&mut self, draft: DraftStop) -> Result<Stop, OverlayError> {
		let mut stop = Stop::new(0, draft.address);
		stop.client = draft.client;
		stop.arrival_window_start = draft.arrival_window_start;
		stop.arrival_window_end = draft.arrival_window_end;
		stop.pending_change = true;
		for action in draft.actions {
			stop.actions.push(self.build_action(action)?);
		}
		Ok(stop)
	}

	/// Materializes a staged action, resolving its transit item.
	fn build_action(&mut self, draft: DraftAction) -> Result<Action, OverlayError> {
		let transit_item_id = match draft.kind {
			ActionKind::Pickup => {
				let draft_item = draft.item.ok_or(OverlayError::MissingItem)?;
				let id = match self.item_keys.get(&draft_item.local_key) {
					Some(id) => id.clone(),
					None => {
						let spec = draft_item.item;
						let item = TransitItem {
							id: ids::item_id(),
							name: spec.name,
							description: spec.description,
							packaging: spec.packaging,
							weight_g: spec.weight_g,
							volume_l: spec.volume_l,
							dimensions: spec.dimensions,
							unitary_price: spec.unitary_price,
							requirements: spec.requirements,
							product_types: spec.product_types,
						};
						let id = item.id.clone();
						self.item_keys.insert(draft_item.local_key, id.clone());
						self.new_items.push(item);
						id
					},
				};
				Some(id)
			},
			ActionKind::Delivery => {
				let key = draft
					.item_ref
					.ok_or_else(|| OverlayError::UnknownItemRef("<none>".into()))?;
				// Either a local key of a staged pickup, or the id of an
				// item already known to the execution record.
				match self.item_keys.get(&key) {
					Some(id) => Some(id.clone()),
					None if self.base_ids.contains(&key) => Some(key),
					None => return Err(OverlayError::UnknownItemRef(key)),
				}
			},
			ActionKind::Service => None,
		};

		let mut action = Action::new(draft.kind);
		action.transit_item_id = transit_item_id;
		action.quantity = draft.quantity;
		action.service_time = draft.service_time;
		action.confirmation_rules = draft.confirmation_rules;
		action.pending_change = true;
		Ok(action)
	}

	/// Removes or marks an entity; locality decides which.
	fn remove(&mut self, entity_id: &str) -> Result<(), OverlayError> {
		let Self {
			steps, base_ids, ..
		} = self;

		// Step?
		if let Some(idx) = steps.iter().position(|s| s.id == entity_id) {
			let is_local = !base_ids.contains(entity_id) && steps[idx].original_id.is_none();
			if is_local {
				steps.remove(idx);
			} else {
				// A step has no delete marker of its own: local stops
				// vanish with it and execution-side stops are marked, so
				// the push empties the step and prunes it.
				let step = &mut steps[idx];
				step.pending_change = true;
				step.stops
					.retain(|stop| stop.original_id.is_some() || base_ids.contains(&stop.id));
				for stop in step.stops.iter_mut() {
					stop.delete_required = true;
					stop.pending_change = true;
				}
			}
			return Ok(());
		}

		// Stop?
		for step in steps.iter_mut() {
			if let Some(idx) = step.stops.iter().position(|s| s.id == entity_id) {
				let is_local = step.stops[idx].original_id.is_none()
					&& !base_ids.contains(entity_id);
				if is_local {
					step.stops.remove(idx);
				} else {
					let stop = &mut step.stops[idx];
					stop.delete_required = true;
					stop.pending_change = true;
				}
				step.pending_change = true;
				return Ok(());
			}
		}

		// Action?
		for step in steps.iter_mut() {
			for stop in step.stops.iter_mut() {
				if let Some(idx) = stop.actions.iter().position(|a| a.id == entity_id) {
					let is_local = stop.actions[idx].original_id.is_none()
						&& !base_ids.contains(entity_id);
					if is_local {
						stop.actions.remove(idx);
					} else {
						let action = &mut stop.actions[idx];
						action.delete_required = true;
						action.pending_change = true;
					}
					stop.pending_change = true;
					step.pending_change = true;
					return Ok(());
				}
			}
		}

		Err(OverlayError::NotFound(entity_id.to_string()))
	}

	fn resequence(&mut self) {
		for (si, step) in self.steps.iter_mut().enumerate() {
			step.sequence = si as u32;
			for (pi, stop) in step.stops.iter_mut().enumerate() {
				stop.sequence = pi as u32;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use dispatch_types::{
		ActionPatch, Address, AssignmentMode, OrderStatus, StopPatch,
	};

	fn record() -> Order {
		let mut step = Step::new(0, true);
		let mut stop_a = Stop::new(0, Address::default());
		stop_a.actions.push(Action::new(ActionKind::Service));
		let stop_b = Stop::new(1, Address::default());
		step.stops.push(stop_a);
		step.stops.push(stop_b);

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

	fn service_action() -> DraftAction {
		DraftAction {
			kind: ActionKind::Service,
			item: None,
			item_ref: None,
			quantity: 1,
			service_time: 120,
			confirmation_rules: Default::default(),
		}
	}

	#[test]
	fn fresh_overlay_has_no_changes() {
		let overlay = Overlay::from_order(&record());
		assert!(!overlay.has_changes());
	}

	#[test]
	fn removing_execution_entity_marks_delete_required() {
		let order = record();
		let stop_id = order.steps[0].stops[1].id.clone();
		let mut overlay = Overlay::from_order(&order);

		overlay
			.apply(EditOp::Remove {
				entity_id: stop_id.clone(),
			})
			.unwrap();

		let stop = overlay.steps[0]
			.stops
			.iter()
			.find(|s| s.id == stop_id)
			.unwrap();
		assert!(stop.delete_required);
		assert!(stop.pending_change);
		assert!(overlay.steps[0].pending_change);
		assert!(overlay.has_changes());
	}

	#[test]
	fn removing_local_addition_discards_it() {
		let order = record();
		let step_id = order.steps[0].id.clone();
		let mut overlay = Overlay::from_order(&order);

		overlay
			.apply(EditOp::AddStop {
				step_id,
				stop: DraftStop {
					address: Address::default(),
					client: None,
					arrival_window_start: None,
					arrival_window_end: None,
					actions: vec![service_action()],
				},
			})
			.unwrap();
		let new_id = overlay.steps[0].stops.last().unwrap().id.clone();
		assert_eq!(overlay.steps[0].stops.len(), 3);

		overlay
			.apply(EditOp::Remove { entity_id: new_id })
			.unwrap();
		assert_eq!(overlay.steps[0].stops.len(), 2);
	}

	#[test]
	fn modifying_execution_stop_creates_shadow() {
		let order = record();
		let stop_id = order.steps[0].stops[0].id.clone();
		let mut overlay = Overlay::from_order(&order);

		overlay
			.apply(EditOp::ModifyStop {
				stop_id: stop_id.clone(),
				patch: StopPatch {
					address: Some(Address {
						formatted_address: Some("new place".into()),
						lat: Some(1.0),
						lng: Some(2.0),
						..Address::default()
					}),
					..StopPatch::default()
				},
			})
			.unwrap();

		let shadow = &overlay.steps[0].stops[0];
		assert_ne!(shadow.id, stop_id);
		assert_eq!(shadow.original_id.as_deref(), Some(stop_id.as_str()));
		assert!(shadow.pending_change);
		// Actions kept their execution-side identity.
		assert!(overlay.base_ids.contains(&shadow.actions[0].id));

		// A second modify patches the shadow in place instead of chaining.
		let shadow_id = shadow.id.clone();
		overlay
			.apply(EditOp::ModifyStop {
				stop_id: shadow_id.clone(),
				patch: StopPatch::default(),
			})
			.unwrap();
		let shadow = &overlay.steps[0].stops[0];
		assert_eq!(shadow.id, shadow_id);
		assert_eq!(shadow.original_id.as_deref(), Some(stop_id.as_str()));
	}

	#[test]
	fn modifying_action_never_touches_status() {
		let order = record();
		let action_id = order.steps[0].stops[0].actions[0].id.clone();
		let before = order.steps[0].stops[0].actions[0].status;
		let mut overlay = Overlay::from_order(&order);

		overlay
			.apply(EditOp::ModifyAction {
				action_id,
				patch: ActionPatch {
					quantity: Some(3),
					..ActionPatch::default()
				},
			})
			.unwrap();

		let shadow = &overlay.steps[0].stops[0].actions[0];
		assert_eq!(shadow.quantity, 3);
		assert_eq!(shadow.status, before);
	}

	#[test]
	fn removing_execution_step_marks_its_stops() {
		let order = record();
		let step_id = order.steps[0].id.clone();
		let mut overlay = Overlay::from_order(&order);

		overlay
			.apply(EditOp::Remove { entity_id: step_id })
			.unwrap();

		assert_eq!(overlay.steps.len(), 1);
		assert!(overlay.steps[0]
			.stops
			.iter()
			.all(|s| s.delete_required));
	}

	#[test]
	fn unknown_entity_is_not_found() {
		let mut overlay = Overlay::from_order(&record());
		let err = overlay
			.apply(EditOp::Remove {
				entity_id: "sto_missing".into(),
			})
			.unwrap_err();
		assert!(matches!(err, OverlayError::NotFound(_)));
	}

	#[test]
	fn merge_refreshes_execution_status() {
		let mut order = record();
		let stop_id = order.steps[0].stops[0].id.clone();
		let mut overlay = Overlay::from_order(&order);

		// Office stages an address change while the field advances.
		overlay
			.apply(EditOp::ModifyStop {
				stop_id: stop_id.clone(),
				patch: StopPatch::default(),
			})
			.unwrap();
		order.stop_mut(&stop_id).unwrap().status = dispatch_types::StopStatus::Arrived;

		let merged = overlay.merge_into(&order);
		let shadow = &merged.steps[0].stops[0];
		assert_eq!(shadow.original_id.as_deref(), Some(stop_id.as_str()));
		assert_eq!(shadow.status, dispatch_types::StopStatus::Arrived);
	}
}
