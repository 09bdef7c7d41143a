//! Event types for engine notifications.
//!
//! Events flow through a fire-and-forget broadcast bus. Consumers treat
//! them purely as refresh triggers and re-read the authoritative record;
//! events are never a source of state.

use serde::{Deserialize, Serialize};

use crate::order::OrderStatus;
use crate::sync::PushConflict;

/// Main event type encompassing all engine events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DispatchEvent {
	/// Events from the order lifecycle.
	Order(OrderEvent),
	/// Events from the submit/push coordinator.
	Sync(SyncEvent),
	/// Events from the routing collaborator.
	Route(RouteEvent),
}

/// Events related to order lifecycle changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderEvent {
	/// A draft entered the execution pipeline.
	Submitted { order_id: String },
	/// The order moved to a new lifecycle status.
	StatusChanged {
		order_id: String,
		status: OrderStatus,
	},
	/// A driver engaged with the mission.
	MissionAccepted {
		order_id: String,
		driver_id: String,
	},
	/// The offered driver declined the mission.
	MissionRefused {
		order_id: String,
		driver_id: String,
	},
}

/// Events related to staged-edit synchronization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SyncEvent {
	/// A push batch was applied to the execution record.
	PushApplied {
		order_id: String,
		applied: usize,
		conflicts: Vec<PushConflict>,
	},
}

/// Events related to route recalculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RouteEvent {
	/// Recalculation has been requested and runs off the critical path.
	RecalculationRequested { order_id: String },
	/// The stored route for the order changed; consumers should re-fetch.
	RouteUpdated { order_id: String },
	/// Recalculation failed; the stale route remains in place.
	RecalculationFailed { order_id: String, error: String },
}
