//! Field-side operations: mission engagement and the stop/action
//! lifecycle drives.
//!
//! Guard violations are rejected outright, never auto-corrected; the
//! caller refreshes and retries. Every accepted transition appends to
//! the entity's status history.

use std::collections::HashMap;

use tracing::instrument;

use dispatch_order::ProofScope;
use dispatch_types::{
	ids::truncate_id, ActionKind, ActionStatus, DispatchEvent, Order, OrderEvent, OrderStatus,
	StatusHistoryEntry, StopStatus,
};

use super::{DispatchEngine, EngineError};
use crate::state;

impl DispatchEngine {
	/// Lists the missions visible to a driver: orders they engaged plus
	/// open offers.
	pub async fn list_missions(&self, driver_id: &str) -> Result<Vec<Order>, EngineError> {
		let mut missions = Vec::new();
		for order_id in self.order_ids().await? {
			let order = match self.load_order(&order_id).await {
				Ok(order) => order,
				Err(EngineError::NotFound(_)) => continue,
				Err(e) => return Err(e),
			};

			let engaged = order.driver_id.as_deref() == Some(driver_id);
			let offered = order.status == OrderStatus::Pending
				&& match order.assignment_mode {
					dispatch_types::AssignmentMode::Target => {
						order.ref_id.as_deref() == Some(driver_id)
					},
					_ => true,
				};

			if engaged || offered {
				missions.push(order);
			}
		}
		Ok(missions)
	}

	/// Engages a driver with a pending order.
	#[instrument(skip(self), fields(order_id = %truncate_id(order_id)))]
	pub async fn accept_mission(
		&self,
		order_id: &str,
		driver_id: &str,
	) -> Result<Order, EngineError> {
		let updated = self
			.update_order_with(order_id, |order| {
				if order.assignment_mode == dispatch_types::AssignmentMode::Target
					&& order.ref_id.as_deref() != Some(driver_id)
				{
					return Err(EngineError::InvalidState(
						"mission is targeted at another driver".into(),
					));
				}
				state::order::transition(
					order,
					OrderStatus::Accepted,
					Some(format!("accepted by {}", driver_id)),
				)?;
				order.driver_id = Some(driver_id.to_string());
				Ok(())
			})
			.await?;

		self.event_bus
			.publish(DispatchEvent::Order(OrderEvent::MissionAccepted {
				order_id: updated.id.clone(),
				driver_id: driver_id.to_string(),
			}));
		self.event_bus
			.publish(DispatchEvent::Order(OrderEvent::StatusChanged {
				order_id: updated.id.clone(),
				status: updated.status,
			}));

		Ok(updated)
	}

	/// Declines an offered mission; the order stays pending for others.
	#[instrument(skip(self), fields(order_id = %truncate_id(order_id)))]
	pub async fn refuse_mission(
		&self,
		order_id: &str,
		driver_id: &str,
	) -> Result<Order, EngineError> {
		let updated = self
			.update_order_with(order_id, |order| {
				if order.status != OrderStatus::Pending {
					return Err(EngineError::InvalidState(format!(
						"only pending missions can be refused, found {}",
						order.status
					)));
				}
				order.status_history.push(StatusHistoryEntry::new(
					OrderStatus::Pending,
					Some(format!("refused by {}", driver_id)),
				));
				Ok(())
			})
			.await?;

		self.event_bus
			.publish(DispatchEvent::Order(OrderEvent::MissionRefused {
				order_id: updated.id.clone(),
				driver_id: driver_id.to_string(),
			}));

		Ok(updated)
	}

	/// Closes out the mission once every action is resolved.
	#[instrument(skip(self), fields(order_id = %truncate_id(order_id)))]
	pub async fn finish_order(&self, order_id: &str) -> Result<Order, EngineError> {
		let updated = self
			.update_order_with(order_id, |order| {
				if !order.actions_resolved() {
					return Err(EngineError::InvalidState(
						"order still has unresolved actions".into(),
					));
				}
				state::order::transition(order, OrderStatus::Delivered, Some("finished".into()))?;
				Ok(())
			})
			.await?;

		self.event_bus
			.publish(DispatchEvent::Order(OrderEvent::StatusChanged {
				order_id: updated.id.clone(),
				status: updated.status,
			}));

		Ok(updated)
	}

	/// Abandons the mission in the field.
	#[instrument(skip(self), fields(order_id = %truncate_id(order_id)))]
	pub async fn fail_order(
		&self,
		order_id: &str,
		reason: Option<String>,
	) -> Result<Order, EngineError> {
		let updated = self
			.update_order_with(order_id, |order| {
				state::order::transition(order, OrderStatus::Failed, reason)?;
				Ok(())
			})
			.await?;

		self.event_bus
			.publish(DispatchEvent::Order(OrderEvent::StatusChanged {
				order_id: updated.id.clone(),
				status: updated.status,
			}));

		Ok(updated)
	}

	/// Marks the driver as on site; the stop's pending actions become
	/// workable.
	#[instrument(skip(self), fields(stop_id = %truncate_id(stop_id)))]
	pub async fn arrive_at_stop(&self, stop_id: &str) -> Result<Order, EngineError> {
		let order_id = self.resolve_entity(stop_id).await?;
		self.update_order_with(&order_id, |order| {
			ensure_mission_active(order)?;
			ensure_arrival_allowed(order, stop_id)?;

			let stop = order
				.stop_mut(stop_id)
				.ok_or_else(|| EngineError::NotFound(stop_id.to_string()))?;
			if stop.on_hold {
				return Err(EngineError::InvalidState("stop is held".into()));
			}
			state::stop::transition(stop, StopStatus::Arrived, None)?;
			for action in stop.actions.iter_mut() {
				if action.status == ActionStatus::Pending {
					state::action::transition(action, ActionStatus::Arrived, None)?;
				}
			}
			Ok(())
		})
		.await
	}

	/// Puts a stop on hold; lifecycle advances are refused until it is
	/// unfrozen. Reversible, and not a status of its own.
	#[instrument(skip(self), fields(stop_id = %truncate_id(stop_id)))]
	pub async fn freeze_stop(
		&self,
		stop_id: &str,
		reason: Option<String>,
	) -> Result<Order, EngineError> {
		let order_id = self.resolve_entity(stop_id).await?;
		self.update_order_with(&order_id, |order| {
			ensure_mission_active(order)?;
			let stop = order
				.stop_mut(stop_id)
				.ok_or_else(|| EngineError::NotFound(stop_id.to_string()))?;
			if stop.status.is_terminal() {
				return Err(EngineError::InvalidState(format!(
					"cannot hold a stop in terminal status {}",
					stop.status
				)));
			}
			stop.on_hold = true;
			stop.hold_reason = reason.clone();
			stop.status_history
				.push(StatusHistoryEntry::new("HOLD", reason));
			Ok(())
		})
		.await
	}

	/// Releases a held stop.
	#[instrument(skip(self), fields(stop_id = %truncate_id(stop_id)))]
	pub async fn unfreeze_stop(&self, stop_id: &str) -> Result<Order, EngineError> {
		let order_id = self.resolve_entity(stop_id).await?;
		self.update_order_with(&order_id, |order| {
			let stop = order
				.stop_mut(stop_id)
				.ok_or_else(|| EngineError::NotFound(stop_id.to_string()))?;
			if !stop.on_hold {
				return Err(EngineError::InvalidState("stop is not held".into()));
			}
			stop.on_hold = false;
			stop.hold_reason = None;
			stop.status_history
				.push(StatusHistoryEntry::new("RESUMED", None));
			Ok(())
		})
		.await
	}

	/// Closes out a stop once every action is resolved: Completed when
	/// all completed, Partial otherwise.
	#[instrument(skip(self), fields(stop_id = %truncate_id(stop_id)))]
	pub async fn complete_stop(&self, stop_id: &str) -> Result<Order, EngineError> {
		let order_id = self.resolve_entity(stop_id).await?;
		self.update_order_with(&order_id, |order| {
			ensure_mission_active(order)?;
			let stop = order
				.stop_mut(stop_id)
				.ok_or_else(|| EngineError::NotFound(stop_id.to_string()))?;
			state::stop::ensure_completable(stop)?;
			let target = state::stop::close_status(stop);
			state::stop::transition(stop, target, None)?;
			Ok(())
		})
		.await
	}

	/// Abandons a stop; its unresolved actions fail with it.
	#[instrument(skip(self), fields(stop_id = %truncate_id(stop_id)))]
	pub async fn fail_stop(
		&self,
		stop_id: &str,
		reason: Option<String>,
	) -> Result<Order, EngineError> {
		let order_id = self.resolve_entity(stop_id).await?;
		self.update_order_with(&order_id, |order| {
			ensure_mission_active(order)?;
			let stop = order
				.stop_mut(stop_id)
				.ok_or_else(|| EngineError::NotFound(stop_id.to_string()))?;
			state::stop::transition(stop, StopStatus::Failed, reason)?;
			for action in stop.actions.iter_mut() {
				if !action.status.is_resolved() {
					state::action::transition(
						action,
						ActionStatus::Failed,
						Some("stop failed".into()),
					)?;
				}
			}
			Ok(())
		})
		.await
	}

	/// Completes an action after validating its required proofs.
	///
	/// Pickup-phase values captured for compared rules become the
	/// references on the matching rules of every delivery action moving
	/// the same transit item.
	#[instrument(skip(self, proofs), fields(action_id = %truncate_id(action_id)))]
	pub async fn complete_action(
		&self,
		action_id: &str,
		proofs: HashMap<String, String>,
	) -> Result<Order, EngineError> {
		let order_id = self.resolve_entity(action_id).await?;
		self.update_order_with(&order_id, |order| {
			ensure_mission_active(order)?;

			let stop = order
				.stop_of_action(action_id)
				.ok_or_else(|| EngineError::NotFound(action_id.to_string()))?;
			if stop.on_hold {
				return Err(EngineError::InvalidState("stop is held".into()));
			}
			if !matches!(stop.status, StopStatus::Arrived | StopStatus::Partial) {
				return Err(EngineError::InvalidState(format!(
					"stop must be arrived before working actions, found {}",
					stop.status
				)));
			}

			let action = order
				.action(action_id)
				.ok_or_else(|| EngineError::NotFound(action_id.to_string()))?;
			let captured = self.evaluator.evaluate(action, &proofs)?;
			let kind = action.kind;
			let item_id = action.transit_item_id.clone();

			{
				let action = order
					.action_mut(action_id)
					.ok_or_else(|| EngineError::NotFound(action_id.to_string()))?;
				// Actions pushed into an already-arrived stop are still
				// pending; the driver working them is their arrival.
				if action.status == ActionStatus::Pending {
					state::action::transition(action, ActionStatus::Arrived, None)?;
				}
				state::action::transition(action, ActionStatus::Completed, None)?;
			}

			// Store captured pickup references on the delivery side.
			if kind == ActionKind::Pickup && !captured.is_empty() {
				if let Some(item_id) = item_id {
					for step in order.steps.iter_mut() {
						for stop in step.stops.iter_mut() {
							for action in stop.actions.iter_mut() {
								let is_self = action.id == action_id;
								let is_counterpart = action.kind == ActionKind::Delivery
									&& action.transit_item_id.as_deref() == Some(item_id.as_str());
								if !is_self && !is_counterpart {
									continue;
								}
								for cap in &captured {
									let rules = match cap.scope {
										ProofScope::Photo => {
											&mut action.confirmation_rules.photo
										},
										ProofScope::Code => &mut action.confirmation_rules.code,
									};
									if let Some(rule) =
										rules.iter_mut().find(|r| r.name == cap.rule_name)
									{
										rule.reference = Some(cap.value.clone());
									}
								}
							}
						}
					}
				}
			}

			Ok(())
		})
		.await
	}

	/// Freezes an action; reversible via unfreeze.
	#[instrument(skip(self), fields(action_id = %truncate_id(action_id)))]
	pub async fn freeze_action(
		&self,
		action_id: &str,
		reason: Option<String>,
	) -> Result<Order, EngineError> {
		let order_id = self.resolve_entity(action_id).await?;
		self.update_order_with(&order_id, |order| {
			ensure_mission_active(order)?;
			let action = order
				.action_mut(action_id)
				.ok_or_else(|| EngineError::NotFound(action_id.to_string()))?;
			state::action::freeze(action, reason)?;
			Ok(())
		})
		.await
	}

	/// Unfreezes an action, restoring its pre-freeze status.
	#[instrument(skip(self), fields(action_id = %truncate_id(action_id)))]
	pub async fn unfreeze_action(&self, action_id: &str) -> Result<Order, EngineError> {
		let order_id = self.resolve_entity(action_id).await?;
		self.update_order_with(&order_id, |order| {
			ensure_mission_active(order)?;
			let action = order
				.action_mut(action_id)
				.ok_or_else(|| EngineError::NotFound(action_id.to_string()))?;
			state::action::unfreeze(action)?;
			Ok(())
		})
		.await
	}

	/// Marks an action as not performable.
	#[instrument(skip(self), fields(action_id = %truncate_id(action_id)))]
	pub async fn fail_action(
		&self,
		action_id: &str,
		reason: Option<String>,
	) -> Result<Order, EngineError> {
		let order_id = self.resolve_entity(action_id).await?;
		self.update_order_with(&order_id, |order| {
			ensure_mission_active(order)?;
			let action = order
				.action_mut(action_id)
				.ok_or_else(|| EngineError::NotFound(action_id.to_string()))?;
			state::action::transition(action, ActionStatus::Failed, reason)?;
			Ok(())
		})
		.await
	}
}

fn ensure_mission_active(order: &Order) -> Result<(), EngineError> {
	if order.status != OrderStatus::Accepted {
		return Err(EngineError::InvalidState(format!(
			"mission is not active, order status is {}",
			order.status
		)));
	}
	Ok(())
}

/// Ordering guard for arrivals.
///
/// Within a linked step, stops are visited in sequence; while a linked
/// step is mid-flight no stop outside it may be started.
fn ensure_arrival_allowed(order: &Order, stop_id: &str) -> Result<(), EngineError> {
	let step = order
		.steps
		.iter()
		.find(|s| s.stops.iter().any(|p| p.id == stop_id))
		.ok_or_else(|| EngineError::NotFound(stop_id.to_string()))?;

	if step.linked {
		for stop in &step.stops {
			if stop.id == stop_id {
				break;
			}
			if !stop.status.is_closed() {
				return Err(EngineError::InvalidState(format!(
					"linked step visits its stops in order; stop {} is not closed yet",
					stop.id
				)));
			}
		}
	}

	for other in &order.steps {
		if !other.linked || other.id == step.id {
			continue;
		}
		let started = other.stops.iter().any(|p| p.status != StopStatus::Pending);
		let finished = other.stops.iter().all(|p| p.status.is_closed());
		if started && !finished {
			return Err(EngineError::InvalidState(format!(
				"linked step {} is in progress and cannot be interleaved",
				other.id
			)));
		}
	}

	Ok(())
}
