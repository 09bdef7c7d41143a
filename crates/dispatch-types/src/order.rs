//! Core hierarchy types for the dispatch system.
//!
//! This module defines the Order -> Step -> Stop -> Action -> Transit Item
//! tree together with the lifecycle status enums and the staging markers
//! used by the pending-change overlay.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids;

/// Status of an order across its lifecycle.
///
/// Orders are owned by the office while in `Draft`; from `Pending` onward
/// the structure is co-owned by the office and execution by the driver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
	/// Order is being composed and has never been submitted.
	Draft,
	/// Order has been submitted and awaits a driver.
	Pending,
	/// A driver has accepted the mission.
	Accepted,
	/// All work is done; the mission has been closed out.
	Delivered,
	/// The mission was abandoned in the field.
	Failed,
	/// The order was withdrawn before a driver engaged.
	Cancelled,
}

impl OrderStatus {
	/// Returns true for statuses with no outgoing transitions.
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			OrderStatus::Delivered | OrderStatus::Failed | OrderStatus::Cancelled
		)
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			OrderStatus::Draft => "DRAFT",
			OrderStatus::Pending => "PENDING",
			OrderStatus::Accepted => "ACCEPTED",
			OrderStatus::Delivered => "DELIVERED",
			OrderStatus::Failed => "FAILED",
			OrderStatus::Cancelled => "CANCELLED",
		};
		write!(f, "{}", s)
	}
}

/// Status of a stop within an accepted order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopStatus {
	/// Not yet visited.
	Pending,
	/// Driver is on site.
	Arrived,
	/// Closed out with some actions frozen, failed or cancelled.
	Partial,
	/// Closed out with every action completed.
	Completed,
	/// The visit was abandoned.
	Failed,
}

impl StopStatus {
	/// Returns true for statuses with no outgoing transitions.
	pub fn is_terminal(&self) -> bool {
		matches!(self, StopStatus::Completed | StopStatus::Failed)
	}

	/// Returns true once the stop has been closed out and no longer
	/// blocks the order from finishing.
	pub fn is_closed(&self) -> bool {
		matches!(
			self,
			StopStatus::Partial | StopStatus::Completed | StopStatus::Failed
		)
	}
}

impl fmt::Display for StopStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			StopStatus::Pending => "PENDING",
			StopStatus::Arrived => "ARRIVED",
			StopStatus::Partial => "PARTIAL",
			StopStatus::Completed => "COMPLETED",
			StopStatus::Failed => "FAILED",
		};
		write!(f, "{}", s)
	}
}

/// Status of a single action at a stop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
	/// Not yet reachable; the stop has not been visited.
	Pending,
	/// The driver is at the stop and the action can be worked.
	Arrived,
	/// Performed, with required proofs accepted.
	Completed,
	/// Put on ice by the driver; reversible via unfreeze.
	Frozen,
	/// Could not be performed.
	Failed,
	/// Withdrawn by the office.
	Cancelled,
}

impl ActionStatus {
	/// Returns true for irreversible statuses.
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			ActionStatus::Completed | ActionStatus::Failed | ActionStatus::Cancelled
		)
	}

	/// Returns true once the action no longer blocks its stop from
	/// closing out: completed, frozen, cancelled or failed.
	pub fn is_resolved(&self) -> bool {
		self.is_terminal() || matches!(self, ActionStatus::Frozen)
	}
}

impl fmt::Display for ActionStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			ActionStatus::Pending => "PENDING",
			ActionStatus::Arrived => "ARRIVED",
			ActionStatus::Completed => "COMPLETED",
			ActionStatus::Frozen => "FROZEN",
			ActionStatus::Failed => "FAILED",
			ActionStatus::Cancelled => "CANCELLED",
		};
		write!(f, "{}", s)
	}
}

/// How a pending order is offered to drivers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentMode {
	/// Open to the whole marketplace.
	Global,
	/// Restricted to the company fleet.
	Internal,
	/// Offered to one specific driver (`ref_id`).
	Target,
}

/// Kind of work performed at a stop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
	/// Collect a transit item; creates the item record.
	Pickup,
	/// Hand over a transit item picked up earlier in the same order.
	Delivery,
	/// On-site work with no item attached.
	Service,
}

/// Packaging category of a transit item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Packaging {
	Box,
	Fluid,
}

/// A postal location, nullable until resolved by the caller.
///
/// Geocoding is outside the engine; coordinates arrive resolved or not at
/// all, and the draft builder decides whether missing ones are acceptable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub label: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub formatted_address: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub street: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub city: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub country: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub lat: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub lng: Option<f64>,
}

impl Address {
	/// Returns the coordinates when both components are resolved.
	pub fn coordinates(&self) -> Option<(f64, f64)> {
		match (self.lat, self.lng) {
			(Some(lat), Some(lng)) => Some((lat, lng)),
			_ => None,
		}
	}
}

/// Contact details for the person met at a stop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub phone: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub avatar: Option<String>,
}

/// Physical dimensions of a boxed item, in centimeters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimensions {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub width_cm: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub height_cm: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub depth_cm: Option<f64>,
}

/// The physical good moving between a pickup and its delivery.
///
/// Created implicitly by pickup actions and referenced, never duplicated,
/// by the matching delivery actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitItem {
	pub id: String,
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub packaging: Option<Packaging>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub weight_g: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub volume_l: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub dimensions: Option<Dimensions>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub unitary_price: Option<Decimal>,
	/// Handling requirement tags, e.g. "fragile" or "refrigerated".
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub requirements: Vec<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub product_types: Vec<String>,
}

/// A proof the driver must supply before an action may complete.
///
/// `pickup`/`delivery` flag at which phase the proof is required; with
/// `compare` set, the delivery-phase value must match the `reference`
/// captured at pickup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationRule {
	pub name: String,
	#[serde(default)]
	pub pickup: bool,
	#[serde(default)]
	pub delivery: bool,
	#[serde(default)]
	pub compare: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reference: Option<String>,
}

/// Photo and code proof requirements attached to an action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationRules {
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub photo: Vec<ConfirmationRule>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub code: Vec<ConfirmationRule>,
}

impl ConfirmationRules {
	pub fn is_empty(&self) -> bool {
		self.photo.is_empty() && self.code.is_empty()
	}
}

/// One line of an append-only status log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
	pub status: String,
	pub timestamp: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub note: Option<String>,
}

impl StatusHistoryEntry {
	pub fn new(status: impl fmt::Display, note: Option<String>) -> Self {
		Self {
			status: status.to_string(),
			timestamp: Utc::now(),
			note,
		}
	}
}

/// A unit of work at a stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
	pub id: String,
	#[serde(rename = "type")]
	pub kind: ActionKind,
	/// Required for pickup/delivery, absent for service.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub transit_item_id: Option<String>,
	pub quantity: u32,
	/// Expected time on task, in seconds.
	pub service_time: u64,
	#[serde(default, skip_serializing_if = "ConfirmationRules::is_empty")]
	pub confirmation_rules: ConfirmationRules,
	pub status: ActionStatus,
	/// Status to restore when the action is unfrozen.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub frozen_from: Option<ActionStatus>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub status_history: Vec<StatusHistoryEntry>,
	#[serde(rename = "isPendingChange", default, skip_serializing_if = "std::ops::Not::not")]
	pub pending_change: bool,
	#[serde(rename = "isDeleteRequired", default, skip_serializing_if = "std::ops::Not::not")]
	pub delete_required: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub original_id: Option<String>,
}

impl Action {
	/// Creates a fresh, unstarted action of the given kind.
	pub fn new(kind: ActionKind) -> Self {
		Self {
			id: ids::action_id(),
			kind,
			transit_item_id: None,
			quantity: 1,
			service_time: 0,
			confirmation_rules: ConfirmationRules::default(),
			status: ActionStatus::Pending,
			frozen_from: None,
			status_history: Vec::new(),
			pending_change: false,
			delete_required: false,
			original_id: None,
		}
	}
}

/// A physical location visit containing one or more actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
	pub id: String,
	pub sequence: u32,
	pub address: Address,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client: Option<ClientInfo>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub arrival_window_start: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub arrival_window_end: Option<DateTime<Utc>>,
	pub status: StopStatus,
	/// Held by the driver: lifecycle advances are refused until unfrozen.
	/// A hold is not a status and is always reversible.
	#[serde(default, skip_serializing_if = "std::ops::Not::not")]
	pub on_hold: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub hold_reason: Option<String>,
	pub actions: Vec<Action>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub status_history: Vec<StatusHistoryEntry>,
	#[serde(rename = "isPendingChange", default, skip_serializing_if = "std::ops::Not::not")]
	pub pending_change: bool,
	#[serde(rename = "isDeleteRequired", default, skip_serializing_if = "std::ops::Not::not")]
	pub delete_required: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub original_id: Option<String>,
}

impl Stop {
	/// Creates an unvisited stop at the given address.
	pub fn new(sequence: u32, address: Address) -> Self {
		Self {
			id: ids::stop_id(),
			sequence,
			address,
			client: None,
			arrival_window_start: None,
			arrival_window_end: None,
			status: StopStatus::Pending,
			on_hold: false,
			hold_reason: None,
			actions: Vec::new(),
			status_history: Vec::new(),
			pending_change: false,
			delete_required: false,
			original_id: None,
		}
	}

	/// Returns true when every action is resolved and the stop may close.
	pub fn actions_resolved(&self) -> bool {
		self.actions.iter().all(|a| a.status.is_resolved())
	}
}

/// An ordered phase of an order.
///
/// When `linked`, the stops of the step execute contiguously and in
/// sequence, with no interleaving from other steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
	pub id: String,
	pub sequence: u32,
	pub linked: bool,
	pub stops: Vec<Stop>,
	#[serde(rename = "isPendingChange", default, skip_serializing_if = "std::ops::Not::not")]
	pub pending_change: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub original_id: Option<String>,
}

impl Step {
	pub fn new(sequence: u32, linked: bool) -> Self {
		Self {
			id: ids::step_id(),
			sequence,
			linked,
			stops: Vec::new(),
			pending_change: false,
			original_id: None,
		}
	}
}

/// One leg of the computed route, between consecutive stops.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteLeg {
	pub distance_meters: f64,
	pub duration_seconds: f64,
}

/// Route output from the routing collaborator; opaque to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePlan {
	/// Polyline as [lng, lat] pairs.
	pub geometry: Vec<[f64; 2]>,
	pub legs: Vec<RouteLeg>,
}

impl RoutePlan {
	pub fn total_distance_meters(&self) -> f64 {
		self.legs.iter().map(|l| l.distance_meters).sum()
	}

	pub fn total_duration_seconds(&self) -> f64 {
		self.legs.iter().map(|l| l.duration_seconds).sum()
	}
}

/// A multi-stop delivery order: the root of the hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
	pub id: String,
	/// External reference; the target driver in `Target` mode.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ref_id: Option<String>,
	pub assignment_mode: AssignmentMode,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub driver_id: Option<String>,
	pub status: OrderStatus,
	pub steps: Vec<Step>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub transit_items: Vec<TransitItem>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub route: Option<RoutePlan>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub status_history: Vec<StatusHistoryEntry>,
	/// Idempotency key of the last applied push batch.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_push_batch: Option<String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Order {
	/// Iterates over every stop in step, then stop, order.
	pub fn stops(&self) -> impl Iterator<Item = &Stop> {
		self.steps.iter().flat_map(|s| s.stops.iter())
	}

	/// Iterates over every action in the hierarchy.
	pub fn actions(&self) -> impl Iterator<Item = &Action> {
		self.stops().flat_map(|s| s.actions.iter())
	}

	pub fn step(&self, id: &str) -> Option<&Step> {
		self.steps.iter().find(|s| s.id == id)
	}

	pub fn step_mut(&mut self, id: &str) -> Option<&mut Step> {
		self.steps.iter_mut().find(|s| s.id == id)
	}

	pub fn stop(&self, id: &str) -> Option<&Stop> {
		self.stops().find(|s| s.id == id)
	}

	pub fn stop_mut(&mut self, id: &str) -> Option<&mut Stop> {
		self.steps
			.iter_mut()
			.flat_map(|s| s.stops.iter_mut())
			.find(|s| s.id == id)
	}

	pub fn action(&self, id: &str) -> Option<&Action> {
		self.actions().find(|a| a.id == id)
	}

	pub fn action_mut(&mut self, id: &str) -> Option<&mut Action> {
		self.steps
			.iter_mut()
			.flat_map(|s| s.stops.iter_mut())
			.flat_map(|s| s.actions.iter_mut())
			.find(|a| a.id == id)
	}

	/// Finds the stop holding the given action.
	pub fn stop_of_action(&self, action_id: &str) -> Option<&Stop> {
		self.stops().find(|s| s.actions.iter().any(|a| a.id == action_id))
	}

	pub fn stop_of_action_mut(&mut self, action_id: &str) -> Option<&mut Stop> {
		self.steps
			.iter_mut()
			.flat_map(|s| s.stops.iter_mut())
			.find(|s| s.actions.iter().any(|a| a.id == action_id))
	}

	pub fn transit_item(&self, id: &str) -> Option<&TransitItem> {
		self.transit_items.iter().find(|i| i.id == id)
	}

	/// Returns true once every action in every stop is resolved.
	pub fn actions_resolved(&self) -> bool {
		self.actions().all(|a| a.status.is_resolved())
	}

	/// Reassigns contiguous sequence numbers to steps and their stops.
	pub fn resequence(&mut self) {
		for (si, step) in self.steps.iter_mut().enumerate() {
			step.sequence = si as u32;
			for (pi, stop) in step.stops.iter_mut().enumerate() {
				stop.sequence = pi as u32;
			}
		}
	}
}
