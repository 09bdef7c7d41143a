//! Core dispatch engine coordinating composition and execution.
//!
//! The engine owns the authoritative execution records and the staged
//! overlays, wires the storage and routing collaborators together, and
//! exposes the office-side (composition) and field-side (execution)
//! operation surfaces. It publishes fire-and-forget events; callers
//! re-read the merged hierarchy after any mutation.

pub mod composition;
pub mod event_bus;
pub mod execution;

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use dispatch_config::Config;
use dispatch_order::{DraftError, OverlayError, ProofError};
use dispatch_order::{ConfirmationEvaluator, Overlay};
use dispatch_routing::RoutingService;
use dispatch_storage::{StorageError, StorageService};
use dispatch_types::{
	ids::truncate_id, DispatchEvent, Order, PushReport, RouteEvent, StorageKey, ValidationIssue,
};

use event_bus::EventBus;

/// Errors surfaced by engine operations.
///
/// The variants mirror the error taxonomy of the system: validation
/// problems are fixable by the caller, state problems require a refresh,
/// push conflicts enumerate dropped edits, and proof failures are
/// retryable with corrected proofs.
#[derive(Debug, Error)]
pub enum EngineError {
	/// Malformed input; the issue list names every finding.
	#[error("validation failed")]
	Validation(Vec<ValidationIssue>),
	/// Operation attempted in the wrong lifecycle state.
	#[error("invalid state: {0}")]
	InvalidState(String),
	/// The referenced entity does not exist or the id is stale.
	#[error("not found: {0}")]
	NotFound(String),
	/// The push batch applied, but some edits were dropped.
	#[error("push applied with {} dropped edit(s)", report.conflicts.len())]
	PushConflict { report: PushReport },
	/// Completion blocked by proof validation.
	#[error(transparent)]
	Proof(#[from] ProofError),
	/// Error from the storage service.
	#[error("storage error: {0}")]
	Storage(String),
	/// Error from the routing collaborator.
	#[error("routing error: {0}")]
	Routing(String),
	/// Error in engine assembly or configuration.
	#[error("configuration error: {0}")]
	Config(String),
}

impl From<DraftError> for EngineError {
	fn from(err: DraftError) -> Self {
		let DraftError::Validation(issues) = err;
		EngineError::Validation(issues)
	}
}

impl From<OverlayError> for EngineError {
	fn from(err: OverlayError) -> Self {
		match err {
			OverlayError::NotFound(id) => EngineError::NotFound(id),
			other => EngineError::Validation(vec![ValidationIssue::error(
				"edit",
				other.to_string(),
				"invalid-edit",
			)]),
		}
	}
}

impl From<crate::state::StateError> for EngineError {
	fn from(err: crate::state::StateError) -> Self {
		EngineError::InvalidState(err.to_string())
	}
}

/// Main engine tying together storage, routing, staging and lifecycle.
pub struct DispatchEngine {
	/// Engine configuration.
	pub(crate) config: Config,
	/// Storage service for records, overlays and indexes.
	pub(crate) storage: Arc<StorageService>,
	/// Routing collaborator for geometry and ETA legs.
	pub(crate) routing: Arc<RoutingService>,
	/// Proof validation for action completion.
	pub(crate) evaluator: ConfirmationEvaluator,
	/// Event bus for fire-and-forget notifications.
	pub(crate) event_bus: EventBus,
}

impl DispatchEngine {
	/// Creates an engine over the given collaborators.
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		routing: Arc<RoutingService>,
		event_bus: EventBus,
	) -> Self {
		Self {
			config,
			storage,
			routing,
			evaluator: ConfirmationEvaluator::default(),
			event_bus,
		}
	}

	/// Returns a reference to the event bus.
	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	/// Returns a reference to the configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Returns the merged view of an order: the staged hierarchy when an
	/// overlay exists, refreshed with execution status from the record.
	pub async fn get_order(&self, order_id: &str) -> Result<Order, EngineError> {
		let record = self.load_order(order_id).await?;
		match self.load_overlay(order_id).await? {
			Some(overlay) => Ok(overlay.merge_into(&record)),
			None => Ok(record),
		}
	}

	/// Loads the authoritative execution record.
	pub(crate) async fn load_order(&self, order_id: &str) -> Result<Order, EngineError> {
		match self
			.storage
			.retrieve::<Order>(StorageKey::Orders.as_str(), order_id)
			.await
		{
			Ok(order) => Ok(order),
			Err(StorageError::NotFound) => Err(EngineError::NotFound(order_id.to_string())),
			Err(e) => Err(EngineError::Storage(e.to_string())),
		}
	}

	/// Loads the staged overlay, if one exists.
	pub(crate) async fn load_overlay(&self, order_id: &str) -> Result<Option<Overlay>, EngineError> {
		match self
			.storage
			.retrieve::<Overlay>(StorageKey::Overlays.as_str(), order_id)
			.await
		{
			Ok(overlay) => Ok(Some(overlay)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(EngineError::Storage(e.to_string())),
		}
	}

	/// Loads, updates and persists an order in one step.
	///
	/// The updater runs against the authoritative record; `updated_at`
	/// is stamped automatically on success.
	pub(crate) async fn update_order_with<F>(
		&self,
		order_id: &str,
		updater: F,
	) -> Result<Order, EngineError>
	where
		F: FnOnce(&mut Order) -> Result<(), EngineError>,
	{
		let mut order = self.load_order(order_id).await?;

		updater(&mut order)?;
		order.updated_at = Utc::now();

		self.storage
			.update(StorageKey::Orders.as_str(), order_id, &order)
			.await
			.map_err(|e| EngineError::Storage(e.to_string()))?;

		Ok(order)
	}

	/// Resolves a stop or action id to its order id via the entity index.
	pub(crate) async fn resolve_entity(&self, entity_id: &str) -> Result<String, EngineError> {
		match self
			.storage
			.retrieve::<String>(StorageKey::EntityIndex.as_str(), entity_id)
			.await
		{
			Ok(order_id) => Ok(order_id),
			Err(StorageError::NotFound) => Err(EngineError::NotFound(entity_id.to_string())),
			Err(e) => Err(EngineError::Storage(e.to_string())),
		}
	}

	/// Indexes every stop and action id of the order for field lookups.
	pub(crate) async fn index_entities(&self, order: &Order) -> Result<(), EngineError> {
		for stop in order.stops() {
			self.storage
				.store(StorageKey::EntityIndex.as_str(), &stop.id, &order.id)
				.await
				.map_err(|e| EngineError::Storage(e.to_string()))?;
			for action in &stop.actions {
				self.storage
					.store(StorageKey::EntityIndex.as_str(), &action.id, &order.id)
					.await
					.map_err(|e| EngineError::Storage(e.to_string()))?;
			}
		}
		Ok(())
	}

	/// Drops index entries for entities removed by a push.
	pub(crate) async fn remove_index(&self, entity_ids: &[String]) -> Result<(), EngineError> {
		for id in entity_ids {
			self.storage
				.remove(StorageKey::EntityIndex.as_str(), id)
				.await
				.map_err(|e| EngineError::Storage(e.to_string()))?;
		}
		Ok(())
	}

	/// Adds the order to the flat index used for mission listing.
	pub(crate) async fn register_order(&self, order_id: &str) -> Result<(), EngineError> {
		let mut ids = self.order_ids().await?;
		if !ids.iter().any(|id| id == order_id) {
			ids.push(order_id.to_string());
			self.storage
				.store(StorageKey::OrderIndex.as_str(), "all", &ids)
				.await
				.map_err(|e| EngineError::Storage(e.to_string()))?;
		}
		Ok(())
	}

	/// Returns the ids of all known orders.
	pub(crate) async fn order_ids(&self) -> Result<Vec<String>, EngineError> {
		match self
			.storage
			.retrieve::<Vec<String>>(StorageKey::OrderIndex.as_str(), "all")
			.await
		{
			Ok(ids) => Ok(ids),
			Err(StorageError::NotFound) => Ok(Vec::new()),
			Err(e) => Err(EngineError::Storage(e.to_string())),
		}
	}

	/// Requests an asynchronous route recalculation for the order.
	///
	/// Never on the critical path: the computation runs in a spawned
	/// task, stores the new route and announces it on the event bus.
	/// Until then the stale route remains visible and self-heals on the
	/// next trigger.
	pub(crate) fn request_recalculation(&self, order: &Order) {
		let waypoints: Vec<(f64, f64)> = order
			.stops()
			.filter_map(|stop| stop.address.coordinates())
			.collect();

		if waypoints.len() < 2 {
			tracing::debug!(
				order_id = %truncate_id(&order.id),
				"Skipping route recalculation: not enough resolved stops"
			);
			return;
		}

		self.event_bus
			.publish(DispatchEvent::Route(RouteEvent::RecalculationRequested {
				order_id: order.id.clone(),
			}));

		let order_id = order.id.clone();
		let routing = self.routing.clone();
		let storage = self.storage.clone();
		let event_bus = self.event_bus.clone();

		tokio::spawn(async move {
			match routing.compute_route(&waypoints).await {
				Ok(route) => {
					let mut order: Order = match storage
						.retrieve(StorageKey::Orders.as_str(), &order_id)
						.await
					{
						Ok(order) => order,
						Err(e) => {
							tracing::warn!(
								order_id = %truncate_id(&order_id),
								error = %e,
								"Route computed but order vanished"
							);
							return;
						},
					};
					order.route = Some(route);
					order.updated_at = Utc::now();
					if let Err(e) = storage
						.update(StorageKey::Orders.as_str(), &order_id, &order)
						.await
					{
						tracing::warn!(
							order_id = %truncate_id(&order_id),
							error = %e,
							"Failed to store recalculated route"
						);
						return;
					}
					event_bus.publish(DispatchEvent::Route(RouteEvent::RouteUpdated {
						order_id,
					}));
				},
				Err(e) => {
					tracing::warn!(
						order_id = %truncate_id(&order_id),
						error = %e,
						"Route recalculation failed"
					);
					event_bus.publish(DispatchEvent::Route(RouteEvent::RecalculationFailed {
						order_id,
						error: e.to_string(),
					}));
				},
			}
		});
	}
}

#[cfg(test)]
pub(crate) mod testing {
	//! Shared fixtures for engine tests.

	use super::*;
	use dispatch_config::{DispatchConfig, RoutingConfig, StorageConfig};
	use dispatch_routing::implementations::haversine::HaversineRouting;
	use dispatch_storage::implementations::memory::MemoryStorage;
	use dispatch_types::{
		Address, ConfirmationRule, ConfirmationRules, DraftAction, DraftHierarchy, DraftStep,
		DraftStop, DraftTransitItem, TransitItemSpec,
	};
	use std::collections::HashMap;

	pub fn test_engine() -> DispatchEngine {
		let config = Config {
			dispatch: DispatchConfig {
				id: "dispatch-test".into(),
			},
			storage: StorageConfig {
				primary: "memory".into(),
				implementations: HashMap::from([(
					"memory".to_string(),
					toml::Value::Table(Default::default()),
				)]),
			},
			routing: RoutingConfig {
				primary: "haversine".into(),
				implementations: HashMap::from([(
					"haversine".to_string(),
					toml::Value::Table(Default::default()),
				)]),
			},
			api: None,
		};

		DispatchEngine::new(
			config,
			Arc::new(StorageService::new(Box::new(MemoryStorage::new()))),
			Arc::new(RoutingService::new(Box::new(HaversineRouting::new(10.0)))),
			EventBus::new(64),
		)
	}

	pub fn address(lat: f64, lng: f64) -> Address {
		Address {
			formatted_address: Some("somewhere".into()),
			lat: Some(lat),
			lng: Some(lng),
			..Address::default()
		}
	}

	pub fn otp_rules() -> ConfirmationRules {
		ConfirmationRules {
			photo: vec![],
			code: vec![ConfirmationRule {
				name: "otp".into(),
				pickup: true,
				delivery: true,
				compare: true,
				reference: None,
			}],
		}
	}

	/// One linked step: pickup of a Widget at stop A, delivery at stop B,
	/// both protected by a compared "otp" code rule.
	pub fn widget_hierarchy() -> DraftHierarchy {
		DraftHierarchy {
			steps: vec![DraftStep {
				linked: true,
				stops: vec![
					DraftStop {
						address: address(5.30966, -4.01266),
						client: None,
						arrival_window_start: None,
						arrival_window_end: None,
						actions: vec![DraftAction {
							kind: dispatch_types::ActionKind::Pickup,
							item: Some(DraftTransitItem {
								local_key: "widget".into(),
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
							}),
							item_ref: None,
							quantity: 1,
							service_time: 60,
							confirmation_rules: otp_rules(),
						}],
					},
					DraftStop {
						address: address(5.3599517, -3.9972323),
						client: None,
						arrival_window_start: None,
						arrival_window_end: None,
						actions: vec![DraftAction {
							kind: dispatch_types::ActionKind::Delivery,
							item: None,
							item_ref: Some("widget".into()),
							quantity: 1,
							service_time: 60,
							confirmation_rules: otp_rules(),
						}],
					},
				],
			}],
			driver_id: None,
			ref_id: None,
		}
	}

	/// Creates, submits and accepts the widget order; returns it.
	pub async fn accepted_widget_order(engine: &DispatchEngine) -> Order {
		let (order_id, _) = engine.create_draft(widget_hierarchy()).await.unwrap();
		engine.submit(&order_id).await.unwrap();
		engine.accept_mission(&order_id, "drv_1").await.unwrap()
	}
}
