//! Staged edit operations for in-flight orders.
//!
//! Once an order has left `Draft`, the office no longer mutates the
//! hierarchy directly; it stages `EditOp`s against the pending-change
//! overlay and flushes them with a push. Patches deliberately carry no
//! status fields: execution status belongs to the field side alone.

use serde::{Deserialize, Serialize};

use crate::order::{Address, ClientInfo, ConfirmationRules};
use crate::payload::{DraftAction, DraftStop};
use chrono::{DateTime, Utc};

/// A structural edit staged against an in-flight order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EditOp {
	/// Appends a new step after the existing ones.
	AddStep {
		#[serde(default)]
		linked: bool,
	},
	/// Appends a new stop to a step.
	AddStop { step_id: String, stop: DraftStop },
	/// Appends a new action to a stop.
	AddAction { stop_id: String, action: DraftAction },
	/// Patches step-level fields.
	ModifyStep { step_id: String, patch: StepPatch },
	/// Patches stop-level fields.
	ModifyStop { stop_id: String, patch: StopPatch },
	/// Patches action-level fields.
	ModifyAction { action_id: String, patch: ActionPatch },
	/// Removes a step, stop or action by id.
	Remove { entity_id: String },
}

/// Partial update of a step; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepPatch {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub linked: Option<bool>,
}

/// Partial update of a stop; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopPatch {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub address: Option<Address>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client: Option<ClientInfo>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub arrival_window_start: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub arrival_window_end: Option<DateTime<Utc>>,
}

/// Partial update of an action; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPatch {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub quantity: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub service_time: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub confirmation_rules: Option<ConfirmationRules>,
}
