//! Types describing the outcome of a push batch.

use serde::{Deserialize, Serialize};

/// A staged edit dropped at push time because its target was gone.
///
/// Conflicts are enumerated back to the caller for display; the rest of
/// the batch still applies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushConflict {
	/// Id of the staged entity whose edit was dropped.
	pub entity_id: String,
	/// Id of the execution-record target that no longer accepts the edit.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub target_id: Option<String>,
	pub reason: String,
}

/// Result of flushing the overlay to the execution record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushReport {
	pub order_id: String,
	/// Number of create/replace/delete operations applied.
	pub applied: usize,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub conflicts: Vec<PushConflict>,
	/// Whether a route recalculation was requested by this push.
	pub recalculation_requested: bool,
}

impl PushReport {
	/// A push against an empty overlay: nothing applied, nothing stale.
	pub fn noop(order_id: impl Into<String>) -> Self {
		Self {
			order_id: order_id.into(),
			applied: 0,
			conflicts: Vec::new(),
			recalculation_requested: false,
		}
	}
}
