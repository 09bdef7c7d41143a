//! Office-side operations: draft creation, submission, staged edits and
//! the push protocol.

use tracing::instrument;

use dispatch_order::{apply_overlay, DraftBuilder, Overlay};
use dispatch_types::{
	ids::truncate_id, DispatchEvent, DraftHierarchy, EditOp, Order, OrderEvent, OrderStatus,
	PushReport, StorageKey, SyncEvent, ValidationIssue,
};

use super::{DispatchEngine, EngineError};
use crate::state;

impl DispatchEngine {
	/// Builds and persists a new draft order from a local hierarchy.
	///
	/// Returns the new order id along with non-fatal validation warnings.
	#[instrument(skip_all)]
	pub async fn create_draft(
		&self,
		hierarchy: DraftHierarchy,
	) -> Result<(String, Vec<ValidationIssue>), EngineError> {
		let (payload, warnings) = DraftBuilder::build(&hierarchy)?;
		let order = DraftBuilder::materialize(payload);

		self.storage
			.store(StorageKey::Orders.as_str(), &order.id, &order)
			.await
			.map_err(|e| EngineError::Storage(e.to_string()))?;
		self.register_order(&order.id).await?;

		tracing::info!(
			order_id = %truncate_id(&order.id),
			steps = order.steps.len(),
			warnings = warnings.len(),
			"Draft created"
		);

		Ok((order.id, warnings))
	}

	/// Moves a draft into the execution pipeline.
	///
	/// Requires `Draft` status and at least one step with at least one
	/// stop. Triggers route computation off the critical path.
	#[instrument(skip(self), fields(order_id = %truncate_id(order_id)))]
	pub async fn submit(&self, order_id: &str) -> Result<Order, EngineError> {
		let order = self.load_order(order_id).await?;

		if order.status != OrderStatus::Draft {
			return Err(EngineError::InvalidState(format!(
				"submit requires a draft order, found {}",
				order.status
			)));
		}
		if !order.steps.iter().any(|s| !s.stops.is_empty()) {
			return Err(EngineError::Validation(vec![ValidationIssue::error(
				"steps",
				"an order needs at least one step with at least one stop",
				"empty-order",
			)]));
		}

		let updated = self
			.update_order_with(order_id, |order| {
				state::order::transition(order, OrderStatus::Pending, Some("submitted".into()))?;
				Ok(())
			})
			.await?;

		// Drafts never stage; stray overlay state would only confuse a
		// later push.
		self.clear_overlay(order_id).await?;
		self.index_entities(&updated).await?;

		self.event_bus
			.publish(DispatchEvent::Order(OrderEvent::Submitted {
				order_id: updated.id.clone(),
			}));
		self.event_bus
			.publish(DispatchEvent::Order(OrderEvent::StatusChanged {
				order_id: updated.id.clone(),
				status: updated.status,
			}));

		self.request_recalculation(&updated);

		tracing::info!("Submitted");
		Ok(updated)
	}

	/// Stages one structural edit against an order.
	///
	/// Draft orders are mutated directly; for in-flight orders the edit
	/// lands in the pending-change overlay and the merged view is
	/// returned. Terminal orders reject edits.
	#[instrument(skip(self, op), fields(order_id = %truncate_id(order_id)))]
	pub async fn stage_edit(&self, order_id: &str, op: EditOp) -> Result<Order, EngineError> {
		let record = self.load_order(order_id).await?;

		if record.status.is_terminal() {
			return Err(EngineError::InvalidState(format!(
				"cannot edit an order in terminal status {}",
				record.status
			)));
		}

		// Drafts have no overlay: edits mutate the hierarchy in place.
		if record.status == OrderStatus::Draft {
			return self
				.update_order_with(order_id, |order| apply_direct(order, op))
				.await;
		}

		let mut overlay = match self.load_overlay(order_id).await? {
			Some(overlay) => overlay,
			None => Overlay::from_order(&record),
		};
		overlay.apply(op)?;

		self.storage
			.store(StorageKey::Overlays.as_str(), order_id, &overlay)
			.await
			.map_err(|e| EngineError::Storage(e.to_string()))?;

		Ok(overlay.merge_into(&record))
	}

	/// Flushes the staged overlay to the execution record as one atomic
	/// batch.
	///
	/// A push with nothing staged is a no-op. A retried push whose batch
	/// already landed only clears the staging state. Conflicting edits
	/// are dropped and reported through `EngineError::PushConflict`; the
	/// rest of the batch still applies.
	#[instrument(skip(self), fields(order_id = %truncate_id(order_id)))]
	pub async fn push(&self, order_id: &str) -> Result<PushReport, EngineError> {
		let record = self.load_order(order_id).await?;

		if record.status == OrderStatus::Draft {
			return Err(EngineError::InvalidState(
				"draft orders are edited directly and submitted, not pushed".into(),
			));
		}
		if record.status.is_terminal() {
			return Err(EngineError::InvalidState(format!(
				"cannot push to an order in terminal status {}",
				record.status
			)));
		}

		let Some(overlay) = self.load_overlay(order_id).await? else {
			return Ok(PushReport::noop(order_id));
		};

		// A retried push must not double-apply: the batch id marks the
		// record once the batch has landed.
		if record.last_push_batch.as_deref() == Some(overlay.batch_id.as_str()) {
			self.clear_overlay(order_id).await?;
			tracing::info!("Push batch already applied, clearing staging state");
			return Ok(PushReport::noop(order_id));
		}

		if !overlay.has_changes() {
			self.clear_overlay(order_id).await?;
			return Ok(PushReport::noop(order_id));
		}

		// The batch lands on a copy; one write makes it visible.
		let mut updated = record.clone();
		let outcome = apply_overlay(&mut updated, &overlay);

		self.storage
			.update(StorageKey::Orders.as_str(), order_id, &updated)
			.await
			.map_err(|e| EngineError::Storage(e.to_string()))?;
		self.clear_overlay(order_id).await?;

		self.remove_index(&outcome.removed_entity_ids).await?;
		self.index_entities(&updated).await?;

		if outcome.address_changed {
			self.request_recalculation(&updated);
		}

		self.event_bus
			.publish(DispatchEvent::Sync(SyncEvent::PushApplied {
				order_id: order_id.to_string(),
				applied: outcome.applied,
				conflicts: outcome.conflicts.clone(),
			}));

		tracing::info!(
			applied = outcome.applied,
			conflicts = outcome.conflicts.len(),
			"Push applied"
		);

		let report = PushReport {
			order_id: order_id.to_string(),
			applied: outcome.applied,
			conflicts: outcome.conflicts,
			recalculation_requested: outcome.address_changed,
		};

		if report.conflicts.is_empty() {
			Ok(report)
		} else {
			Err(EngineError::PushConflict { report })
		}
	}

	/// Withdraws a pending order before any driver engages.
	#[instrument(skip(self), fields(order_id = %truncate_id(order_id)))]
	pub async fn cancel_order(&self, order_id: &str) -> Result<Order, EngineError> {
		let updated = self
			.update_order_with(order_id, |order| {
				if order.status != OrderStatus::Pending {
					return Err(EngineError::InvalidState(format!(
						"only pending orders can be cancelled, found {}",
						order.status
					)));
				}
				state::order::transition(
					order,
					OrderStatus::Cancelled,
					Some("cancelled by the office".into()),
				)?;
				Ok(())
			})
			.await?;

		self.clear_overlay(order_id).await?;

		self.event_bus
			.publish(DispatchEvent::Order(OrderEvent::StatusChanged {
				order_id: updated.id.clone(),
				status: updated.status,
			}));

		Ok(updated)
	}

	/// Cancels an action on behalf of the office.
	#[instrument(skip(self), fields(action_id = %truncate_id(action_id)))]
	pub async fn cancel_action(
		&self,
		action_id: &str,
		note: Option<String>,
	) -> Result<Order, EngineError> {
		let order_id = self.resolve_entity(action_id).await?;
		self.update_order_with(&order_id, |order| {
			let action = order
				.action_mut(action_id)
				.ok_or_else(|| EngineError::NotFound(action_id.to_string()))?;
			state::action::transition(action, dispatch_types::ActionStatus::Cancelled, note)?;
			Ok(())
		})
		.await
	}

	async fn clear_overlay(&self, order_id: &str) -> Result<(), EngineError> {
		self.storage
			.remove(StorageKey::Overlays.as_str(), order_id)
			.await
			.map_err(|e| EngineError::Storage(e.to_string()))
	}
}

/// Applies an edit directly to a draft hierarchy, leaving no staging
/// markers behind.
fn apply_direct(order: &mut Order, op: EditOp) -> Result<(), EngineError> {
	let mut overlay = Overlay::from_order(order);
	// With no base entities every edit behaves as a local one: patches
	// land in place and removals discard outright. Items stay known so
	// staged deliveries can reference them.
	overlay
		.base_ids
		.retain(|id| order.transit_items.iter().any(|i| &i.id == id));

	overlay.apply(op)?;

	order
		.transit_items
		.extend(overlay.new_items.iter().cloned());
	order.steps = overlay.steps;
	scrub_markers(order);
	order.resequence();
	Ok(())
}

fn scrub_markers(order: &mut Order) {
	for step in order.steps.iter_mut() {
		step.pending_change = false;
		step.original_id = None;
		for stop in step.stops.iter_mut() {
			stop.pending_change = false;
			stop.delete_required = false;
			stop.original_id = None;
			for action in stop.actions.iter_mut() {
				action.pending_change = false;
				action.delete_required = false;
				action.original_id = None;
			}
		}
	}
}
