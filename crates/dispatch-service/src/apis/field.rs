//! Field-side endpoints: mission engagement and stop/action lifecycle.
//!
//! Driver identity arrives in the request since authentication is
//! handled upstream of this service.

use axum::{
	extract::{Path, Query, State},
	response::Json,
};
use serde::Deserialize;

use dispatch_types::{ApiError, Order, OrderResponse, ProofSubmission, ReasonBody};

use super::map_engine_error;
use crate::server::AppState;

/// Query parameters for mission listing.
#[derive(Debug, Deserialize)]
pub struct MissionQuery {
	#[serde(rename = "driverId")]
	pub driver_id: String,
}

/// Body carrying the acting driver's id.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverBody {
	pub driver_id: String,
}

/// Handles GET /v1/missions?driverId=...
pub async fn list_missions(
	Query(query): Query<MissionQuery>,
	State(state): State<AppState>,
) -> Result<Json<Vec<Order>>, ApiError> {
	let missions = state
		.engine
		.list_missions(&query.driver_id)
		.await
		.map_err(map_engine_error)?;
	Ok(Json(missions))
}

/// Handles POST /v1/missions/{id}/accept.
pub async fn accept_mission(
	Path(id): Path<String>,
	State(state): State<AppState>,
	Json(body): Json<DriverBody>,
) -> Result<Json<OrderResponse>, ApiError> {
	let order = state
		.engine
		.accept_mission(&id, &body.driver_id)
		.await
		.map_err(map_engine_error)?;
	Ok(Json(OrderResponse {
		order,
		message: "mission accepted".to_string(),
	}))
}

/// Handles POST /v1/missions/{id}/refuse.
pub async fn refuse_mission(
	Path(id): Path<String>,
	State(state): State<AppState>,
	Json(body): Json<DriverBody>,
) -> Result<Json<OrderResponse>, ApiError> {
	let order = state
		.engine
		.refuse_mission(&id, &body.driver_id)
		.await
		.map_err(map_engine_error)?;
	Ok(Json(OrderResponse {
		order,
		message: "mission refused".to_string(),
	}))
}

/// Handles POST /v1/missions/{id}/finish.
pub async fn finish_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<OrderResponse>, ApiError> {
	let order = state
		.engine
		.finish_order(&id)
		.await
		.map_err(map_engine_error)?;
	Ok(Json(OrderResponse {
		order,
		message: "mission finished".to_string(),
	}))
}

/// Handles POST /v1/missions/{id}/fail.
pub async fn fail_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
	Json(body): Json<ReasonBody>,
) -> Result<Json<OrderResponse>, ApiError> {
	let order = state
		.engine
		.fail_order(&id, body.reason)
		.await
		.map_err(map_engine_error)?;
	Ok(Json(OrderResponse {
		order,
		message: "mission failed".to_string(),
	}))
}

/// Handles POST /v1/stops/{id}/arrival.
pub async fn arrive_at_stop(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<OrderResponse>, ApiError> {
	let order = state
		.engine
		.arrive_at_stop(&id)
		.await
		.map_err(map_engine_error)?;
	Ok(Json(OrderResponse {
		order,
		message: "arrival recorded".to_string(),
	}))
}

/// Handles POST /v1/stops/{id}/freeze.
pub async fn freeze_stop(
	Path(id): Path<String>,
	State(state): State<AppState>,
	Json(body): Json<ReasonBody>,
) -> Result<Json<OrderResponse>, ApiError> {
	let order = state
		.engine
		.freeze_stop(&id, body.reason)
		.await
		.map_err(map_engine_error)?;
	Ok(Json(OrderResponse {
		order,
		message: "stop held".to_string(),
	}))
}

/// Handles POST /v1/stops/{id}/unfreeze.
pub async fn unfreeze_stop(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<OrderResponse>, ApiError> {
	let order = state
		.engine
		.unfreeze_stop(&id)
		.await
		.map_err(map_engine_error)?;
	Ok(Json(OrderResponse {
		order,
		message: "stop released".to_string(),
	}))
}

/// Handles POST /v1/stops/{id}/complete.
pub async fn complete_stop(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<OrderResponse>, ApiError> {
	let order = state
		.engine
		.complete_stop(&id)
		.await
		.map_err(map_engine_error)?;
	Ok(Json(OrderResponse {
		order,
		message: "stop completed".to_string(),
	}))
}

/// Handles POST /v1/stops/{id}/fail.
pub async fn fail_stop(
	Path(id): Path<String>,
	State(state): State<AppState>,
	Json(body): Json<ReasonBody>,
) -> Result<Json<OrderResponse>, ApiError> {
	let order = state
		.engine
		.fail_stop(&id, body.reason)
		.await
		.map_err(map_engine_error)?;
	Ok(Json(OrderResponse {
		order,
		message: "stop failed".to_string(),
	}))
}

/// Handles POST /v1/actions/{id}/complete.
pub async fn complete_action(
	Path(id): Path<String>,
	State(state): State<AppState>,
	Json(body): Json<ProofSubmission>,
) -> Result<Json<OrderResponse>, ApiError> {
	let order = state
		.engine
		.complete_action(&id, body.proofs)
		.await
		.map_err(map_engine_error)?;
	Ok(Json(OrderResponse {
		order,
		message: "action completed".to_string(),
	}))
}

/// Handles POST /v1/actions/{id}/freeze.
pub async fn freeze_action(
	Path(id): Path<String>,
	State(state): State<AppState>,
	Json(body): Json<ReasonBody>,
) -> Result<Json<OrderResponse>, ApiError> {
	let order = state
		.engine
		.freeze_action(&id, body.reason)
		.await
		.map_err(map_engine_error)?;
	Ok(Json(OrderResponse {
		order,
		message: "action frozen".to_string(),
	}))
}

/// Handles POST /v1/actions/{id}/unfreeze.
pub async fn unfreeze_action(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<OrderResponse>, ApiError> {
	let order = state
		.engine
		.unfreeze_action(&id)
		.await
		.map_err(map_engine_error)?;
	Ok(Json(OrderResponse {
		order,
		message: "action resumed".to_string(),
	}))
}

/// Handles POST /v1/actions/{id}/fail.
pub async fn fail_action(
	Path(id): Path<String>,
	State(state): State<AppState>,
	Json(body): Json<ReasonBody>,
) -> Result<Json<OrderResponse>, ApiError> {
	let order = state
		.engine
		.fail_action(&id, body.reason)
		.await
		.map_err(map_engine_error)?;
	Ok(Json(OrderResponse {
		order,
		message: "action failed".to_string(),
	}))
}
