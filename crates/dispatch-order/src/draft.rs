//! Draft builder: normalizes a locally edited hierarchy into the
//! canonical creation payload.
//!
//! The builder is a pure transform. It hoists transit items out of pickup
//! actions (deduplicated by local key), rewires delivery actions to the
//! hoisted items, re-indexes sequences, derives the assignment mode and
//! reports validation issues with hierarchical paths. Persistence happens
//! only when the coordinator submits the result.

use chrono::Utc;
use std::collections::HashMap;

use dispatch_types::{
	ids, Action, ActionKind, ActionStatus, AssignmentMode, DraftHierarchy, HierarchicalOrderPayload,
	Order, OrderStatus, PayloadAction, PayloadStep, PayloadStop, StatusHistoryEntry, Step, Stop,
	StopStatus, TransitItem, ValidationIssue,
};

use crate::DraftError;

/// Normalizes and validates draft hierarchies.
pub struct DraftBuilder;

impl DraftBuilder {
	/// Builds the creation payload from a locally edited tree.
	///
	/// Returns the payload plus non-fatal warnings. Fails with the full
	/// issue list when any finding is an error.
	pub fn build(
		hierarchy: &DraftHierarchy,
	) -> Result<(HierarchicalOrderPayload, Vec<ValidationIssue>), DraftError> {
		let mut issues: Vec<ValidationIssue> = Vec::new();
		// local item key -> hoisted transit item
		let mut items: HashMap<String, TransitItem> = HashMap::new();
		let mut item_order: Vec<String> = Vec::new();

		if hierarchy.steps.is_empty() {
			issues.push(ValidationIssue::error(
				"steps",
				"an order needs at least one step",
				"empty-order",
			));
		}

		let mut steps: Vec<PayloadStep> = Vec::new();

		for (si, step) in hierarchy.steps.iter().enumerate() {
			let step_path = format!("steps[{}]", si);
			if step.stops.is_empty() {
				issues.push(ValidationIssue::error(
					&step_path,
					"a step needs at least one stop",
					"empty-step",
				));
			}

			let mut stops: Vec<PayloadStop> = Vec::new();
			for (pi, stop) in step.stops.iter().enumerate() {
				let stop_path = format!("{}.stops[{}]", step_path, pi);

				if stop.actions.is_empty() {
					issues.push(ValidationIssue::error(
						&stop_path,
						"a stop needs at least one action",
						"empty-stop",
					));
				}

				if stop.address.coordinates().is_none() {
					// Linked steps execute in routed order, so unresolved
					// addresses there block the build outright.
					if step.linked {
						issues.push(ValidationIssue::error(
							&stop_path,
							"stop address has no resolved coordinates",
							"address-unresolved",
						));
					} else {
						issues.push(ValidationIssue::warning(
							&stop_path,
							"stop address has no resolved coordinates",
							"address-unresolved",
						));
					}
				}

				let mut actions: Vec<PayloadAction> = Vec::new();
				for (ai, action) in stop.actions.iter().enumerate() {
					let action_path = format!("{}.actions[{}]", stop_path, ai);

					if action.quantity == 0 {
						issues.push(ValidationIssue::warning(
							&action_path,
							"action quantity is zero",
							"zero-quantity",
						));
					}

					let transit_item_id = match action.kind {
						ActionKind::Pickup => match &action.item {
							Some(draft_item) => {
								let entry = items
									.entry(draft_item.local_key.clone())
									.or_insert_with(|| {
										item_order.push(draft_item.local_key.clone());
										let spec = &draft_item.item;
										TransitItem {
											id: ids::item_id(),
											name: spec.name.clone(),
											description: spec.description.clone(),
											packaging: spec.packaging,
											weight_g: spec.weight_g,
											volume_l: spec.volume_l,
											dimensions: spec.dimensions.clone(),
											unitary_price: spec.unitary_price,
											requirements: spec.requirements.clone(),
											product_types: spec.product_types.clone(),
										}
									});
								Some(entry.id.clone())
							},
							None => {
								issues.push(ValidationIssue::error(
									&action_path,
									"pickup action has no transit item",
									"missing-item",
								));
								None
							},
						},
						ActionKind::Delivery => match &action.item_ref {
							Some(key) => match items.get(key) {
								Some(item) => Some(item.id.clone()),
								None => {
									issues.push(ValidationIssue::error(
										&action_path,
										format!(
											"delivery references unknown item '{}'; \
											 the pickup must come earlier in the order",
											key
										),
										"unresolved-item",
									));
									None
								},
							},
							None => {
								issues.push(ValidationIssue::error(
									&action_path,
									"delivery action references no transit item",
									"unresolved-item",
								));
								None
							},
						},
						ActionKind::Service => {
							if action.item.is_some() || action.item_ref.is_some() {
								issues.push(ValidationIssue::warning(
									&action_path,
									"service actions carry no transit item; ignored",
									"item-ignored",
								));
							}
							None
						},
					};

					actions.push(PayloadAction {
						kind: action.kind,
						transit_item_id,
						quantity: action.quantity,
						service_time: action.service_time,
						confirmation_rules: action.confirmation_rules.clone(),
					});
				}

				stops.push(PayloadStop {
					sequence: pi as u32,
					address: stop.address.clone(),
					client: stop.client.clone(),
					arrival_window_start: stop.arrival_window_start,
					arrival_window_end: stop.arrival_window_end,
					actions,
				});
			}

			steps.push(PayloadStep {
				sequence: si as u32,
				linked: step.linked,
				stops,
			});
		}

		if issues
			.iter()
			.any(|i| i.severity == dispatch_types::IssueSeverity::Error)
		{
			return Err(DraftError::Validation(issues));
		}

		let assignment_mode = if hierarchy.driver_id.is_some() {
			AssignmentMode::Target
		} else {
			AssignmentMode::Global
		};

		let transit_items = item_order
			.into_iter()
			.filter_map(|key| items.remove(&key))
			.collect();

		let payload = HierarchicalOrderPayload {
			steps,
			transit_items,
			assignment_mode,
			ref_id: hierarchy.driver_id.clone().or_else(|| hierarchy.ref_id.clone()),
		};

		Ok((payload, issues))
	}

	/// Materializes a normalized payload into a fresh draft order.
	pub fn materialize(payload: HierarchicalOrderPayload) -> Order {
		let now = Utc::now();

		let steps = payload
			.steps
			.into_iter()
			.map(|step| {
				let mut s = Step::new(step.sequence, step.linked);
				s.stops = step
					.stops
					.into_iter()
					.map(|stop| {
						let mut p = Stop::new(stop.sequence, stop.address);
						p.client = stop.client;
						p.arrival_window_start = stop.arrival_window_start;
						p.arrival_window_end = stop.arrival_window_end;
						p.status = StopStatus::Pending;
						p.actions = stop
							.actions
							.into_iter()
							.map(|action| {
								let mut a = Action::new(action.kind);
								a.transit_item_id = action.transit_item_id;
								a.quantity = action.quantity;
								a.service_time = action.service_time;
								a.confirmation_rules = action.confirmation_rules;
								a.status = ActionStatus::Pending;
								a
							})
							.collect();
						p
					})
					.collect();
				s
			})
			.collect();

		Order {
			id: ids::order_id(),
			ref_id: payload.ref_id,
			assignment_mode: payload.assignment_mode,
			driver_id: None,
			status: OrderStatus::Draft,
			steps,
			transit_items: payload.transit_items,
			route: None,
			status_history: vec![StatusHistoryEntry::new(OrderStatus::Draft, None)],
			last_push_batch: None,
			created_at: now,
			updated_at: now,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use dispatch_types::{
		Address, DraftAction, DraftStep, DraftStop, DraftTransitItem, IssueSeverity,
		TransitItemSpec,
	};

	fn address(lat: f64, lng: f64) -> Address {
		Address {
			formatted_address: Some("somewhere".into()),
			lat: Some(lat),
			lng: Some(lng),
			..Address::default()
		}
	}

	fn widget_item(key: &str) -> DraftTransitItem {
		DraftTransitItem {
			local_key: key.to_string(),
			item: TransitItemSpec {
				name: "Widget".into(),
				description: None,
				packaging: None,
				weight_g: Some(500),
				volume_l: None,
				dimensions: None,
				unitary_price: None,
				requirements: vec![],
				product_types: vec![],
			},
		}
	}

	fn pickup(key: &str) -> DraftAction {
		DraftAction {
			kind: ActionKind::Pickup,
			item: Some(widget_item(key)),
			item_ref: None,
			quantity: 1,
			service_time: 60,
			confirmation_rules: Default::default(),
		}
	}

	fn delivery(key: &str) -> DraftAction {
		DraftAction {
			kind: ActionKind::Delivery,
			item: None,
			item_ref: Some(key.to_string()),
			quantity: 1,
			service_time: 60,
			confirmation_rules: Default::default(),
		}
	}

	fn pickup_then_delivery() -> DraftHierarchy {
		DraftHierarchy {
			steps: vec![DraftStep {
				linked: true,
				stops: vec![
					DraftStop {
						address: address(5.30966, -4.01266),
						client: None,
						arrival_window_start: None,
						arrival_window_end: None,
						actions: vec![pickup("widget")],
					},
					DraftStop {
						address: address(5.3599517, -3.9972323),
						client: None,
						arrival_window_start: None,
						arrival_window_end: None,
						actions: vec![delivery("widget")],
					},
				],
			}],
			driver_id: None,
			ref_id: None,
		}
	}

	#[test]
	fn hoists_item_once_and_cross_references_delivery() {
		let (payload, warnings) = DraftBuilder::build(&pickup_then_delivery()).unwrap();

		assert!(warnings.is_empty());
		assert_eq!(payload.transit_items.len(), 1);
		let item_id = &payload.transit_items[0].id;

		let pickup = &payload.steps[0].stops[0].actions[0];
		let delivery = &payload.steps[0].stops[1].actions[0];
		assert_eq!(pickup.transit_item_id.as_ref(), Some(item_id));
		assert_eq!(delivery.transit_item_id.as_ref(), Some(item_id));
		assert_eq!(payload.assignment_mode, AssignmentMode::Global);
	}

	#[test]
	fn payload_roundtrip_preserves_referential_integrity() {
		let (payload, _) = DraftBuilder::build(&pickup_then_delivery()).unwrap();
		let json = serde_json::to_string(&payload).unwrap();
		let parsed: HierarchicalOrderPayload = serde_json::from_str(&json).unwrap();

		let item_ids: Vec<&String> = parsed.transit_items.iter().map(|i| &i.id).collect();
		for step in &parsed.steps {
			for stop in &step.stops {
				for action in &stop.actions {
					if matches!(action.kind, ActionKind::Pickup | ActionKind::Delivery) {
						let id = action.transit_item_id.as_ref().unwrap();
						assert!(item_ids.contains(&id));
					}
				}
			}
		}
	}

	#[test]
	fn target_mode_derived_from_preselected_driver() {
		let mut hierarchy = pickup_then_delivery();
		hierarchy.driver_id = Some("usr_42".into());

		let (payload, _) = DraftBuilder::build(&hierarchy).unwrap();
		assert_eq!(payload.assignment_mode, AssignmentMode::Target);
		assert_eq!(payload.ref_id.as_deref(), Some("usr_42"));
	}

	#[test]
	fn stop_without_actions_is_an_error() {
		let mut hierarchy = pickup_then_delivery();
		hierarchy.steps[0].stops[0].actions.clear();

		let err = DraftBuilder::build(&hierarchy).unwrap_err();
		let DraftError::Validation(issues) = err;
		assert!(issues
			.iter()
			.any(|i| i.code.as_deref() == Some("empty-stop")
				&& i.severity == IssueSeverity::Error
				&& i.path == "steps[0].stops[0]"));
	}

	#[test]
	fn unresolved_delivery_reference_is_an_error() {
		let mut hierarchy = pickup_then_delivery();
		hierarchy.steps[0].stops[1].actions[0].item_ref = Some("other".into());

		let err = DraftBuilder::build(&hierarchy).unwrap_err();
		let DraftError::Validation(issues) = err;
		assert!(issues
			.iter()
			.any(|i| i.code.as_deref() == Some("unresolved-item")));
	}

	#[test]
	fn unresolved_address_in_linked_step_is_an_error() {
		let mut hierarchy = pickup_then_delivery();
		hierarchy.steps[0].stops[0].address.lat = None;

		let err = DraftBuilder::build(&hierarchy).unwrap_err();
		let DraftError::Validation(issues) = err;
		assert!(issues
			.iter()
			.any(|i| i.code.as_deref() == Some("address-unresolved")
				&& i.severity == IssueSeverity::Error));

		// The same gap in an unlinked step only warns.
		let mut hierarchy = pickup_then_delivery();
		hierarchy.steps[0].linked = false;
		hierarchy.steps[0].stops[0].address.lat = None;
		let (_, warnings) = DraftBuilder::build(&hierarchy).unwrap();
		assert!(warnings
			.iter()
			.any(|i| i.code.as_deref() == Some("address-unresolved")));
	}

	#[test]
	fn materialize_creates_a_pending_free_draft() {
		let (payload, _) = DraftBuilder::build(&pickup_then_delivery()).unwrap();
		let order = DraftBuilder::materialize(payload);

		assert_eq!(order.status, OrderStatus::Draft);
		assert_eq!(order.steps.len(), 1);
		assert_eq!(order.stops().count(), 2);
		assert!(order.actions().all(|a| a.status == ActionStatus::Pending));
		assert!(order.actions().all(|a| !a.pending_change));
		assert_eq!(order.transit_items.len(), 1);
	}
}
