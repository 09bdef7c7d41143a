//! Draft and creation payload types.
//!
//! The office composes orders as a free-form local tree (`DraftHierarchy`).
//! The draft builder normalizes that tree into a `HierarchicalOrderPayload`,
//! the canonical creation shape: transit items hoisted out of pickup
//! actions, sequences re-indexed and confirmation rules made explicit.

use serde::{Deserialize, Serialize};

use crate::order::{
	Address, AssignmentMode, ClientInfo, ConfirmationRules, TransitItem,
};
use chrono::{DateTime, Utc};

/// Severity of a draft validation finding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
	/// Build still succeeds; surfaced for correction.
	Warning,
	/// Build fails.
	Error,
}

/// A single finding from draft validation.
///
/// `path` addresses the offending entity in hierarchy notation, e.g.
/// `steps[0].stops[1].actions[0]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
	pub path: String,
	#[serde(rename = "type")]
	pub severity: IssueSeverity,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub code: Option<String>,
}

impl ValidationIssue {
	pub fn error(path: impl Into<String>, message: impl Into<String>, code: &str) -> Self {
		Self {
			path: path.into(),
			severity: IssueSeverity::Error,
			message: message.into(),
			code: Some(code.to_string()),
		}
	}

	pub fn warning(path: impl Into<String>, message: impl Into<String>, code: &str) -> Self {
		Self {
			path: path.into(),
			severity: IssueSeverity::Warning,
			message: message.into(),
			code: Some(code.to_string()),
		}
	}
}

/// An action as edited locally before submission.
///
/// Pickup actions describe their transit item inline under a local key;
/// delivery actions reference that key through `item_ref`. The builder
/// hoists the items and rewrites both sides to the hoisted item id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftAction {
	#[serde(rename = "type")]
	pub kind: crate::order::ActionKind,
	/// Inline item description; meaningful on pickup actions only.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub item: Option<DraftTransitItem>,
	/// Local key of the pickup item this delivery hands over.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub item_ref: Option<String>,
	#[serde(default = "default_quantity")]
	pub quantity: u32,
	/// Expected time on task, in seconds.
	#[serde(default)]
	pub service_time: u64,
	#[serde(default, skip_serializing_if = "ConfirmationRules::is_empty")]
	pub confirmation_rules: ConfirmationRules,
}

fn default_quantity() -> u32 {
	1
}

/// A transit item as described inline on a draft pickup action.
///
/// `local_key` identifies the item within the draft so that several
/// pickup/delivery pairs can share one physical item description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftTransitItem {
	pub local_key: String,
	#[serde(flatten)]
	pub item: TransitItemSpec,
}

/// Item fields without identity; the builder assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitItemSpec {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub packaging: Option<crate::order::Packaging>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub weight_g: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub volume_l: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub dimensions: Option<crate::order::Dimensions>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub unitary_price: Option<rust_decimal::Decimal>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub requirements: Vec<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub product_types: Vec<String>,
}

/// A stop as edited locally before submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftStop {
	pub address: Address,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client: Option<ClientInfo>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub arrival_window_start: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub arrival_window_end: Option<DateTime<Utc>>,
	pub actions: Vec<DraftAction>,
}

/// A step as edited locally before submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftStep {
	#[serde(default)]
	pub linked: bool,
	pub stops: Vec<DraftStop>,
}

/// The locally edited tree handed to the draft builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftHierarchy {
	pub steps: Vec<DraftStep>,
	/// Pre-selected driver; forces `Target` assignment.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub driver_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ref_id: Option<String>,
}

/// Normalized creation payload produced by the draft builder.
///
/// This is a pure data shape: hoisted transit items, contiguous sequences
/// and a derived assignment mode. Persisting it is the coordinator's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchicalOrderPayload {
	pub steps: Vec<PayloadStep>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub transit_items: Vec<TransitItem>,
	pub assignment_mode: AssignmentMode,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ref_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadStep {
	pub sequence: u32,
	pub linked: bool,
	pub stops: Vec<PayloadStop>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadStop {
	pub sequence: u32,
	pub address: Address,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client: Option<ClientInfo>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub arrival_window_start: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub arrival_window_end: Option<DateTime<Utc>>,
	pub actions: Vec<PayloadAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadAction {
	#[serde(rename = "type")]
	pub kind: crate::order::ActionKind,
	/// Resolved id into `transit_items`; required for pickup/delivery.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub transit_item_id: Option<String>,
	pub quantity: u32,
	pub service_time: u64,
	#[serde(default, skip_serializing_if = "ConfirmationRules::is_empty")]
	pub confirmation_rules: ConfirmationRules,
}
