//! Office-side endpoints: draft composition, submission, staged edits
//! and the push protocol.

use axum::{
	extract::{Path, State},
	response::Json,
};
use dispatch_types::{
	ApiError, CreateDraftResponse, DraftHierarchy, EditOp, NoteBody, Order, OrderResponse,
	PushResponse,
};

use super::map_engine_error;
use crate::server::AppState;

/// Handles POST /v1/orders.
///
/// Builds a draft order from a locally edited hierarchy and returns its
/// id along with validation warnings.
pub async fn create_draft(
	State(state): State<AppState>,
	Json(hierarchy): Json<DraftHierarchy>,
) -> Result<Json<CreateDraftResponse>, ApiError> {
	let (order_id, warnings) = state
		.engine
		.create_draft(hierarchy)
		.await
		.map_err(map_engine_error)?;
	Ok(Json(CreateDraftResponse { order_id, warnings }))
}

/// Handles GET /v1/orders/{id}.
///
/// Returns the merged view: the staged hierarchy when edits are pending,
/// refreshed with execution status from the authoritative record.
pub async fn get_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<Order>, ApiError> {
	let order = state.engine.get_order(&id).await.map_err(map_engine_error)?;
	Ok(Json(order))
}

/// Handles POST /v1/orders/{id}/submit.
pub async fn submit(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<OrderResponse>, ApiError> {
	let order = state.engine.submit(&id).await.map_err(map_engine_error)?;
	Ok(Json(OrderResponse {
		order,
		message: "order submitted".to_string(),
	}))
}

/// Handles POST /v1/orders/{id}/edits.
///
/// Stages one structural edit; returns the merged view.
pub async fn stage_edit(
	Path(id): Path<String>,
	State(state): State<AppState>,
	Json(op): Json<EditOp>,
) -> Result<Json<OrderResponse>, ApiError> {
	let order = state
		.engine
		.stage_edit(&id, op)
		.await
		.map_err(map_engine_error)?;
	Ok(Json(OrderResponse {
		order,
		message: "edit staged".to_string(),
	}))
}

/// Handles POST /v1/orders/{id}/push-updates.
///
/// Flushes staged edits to the execution record. Conflicts surface as a
/// 409 carrying the partial-application report.
pub async fn push(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<PushResponse>, ApiError> {
	let report = state.engine.push(&id).await.map_err(map_engine_error)?;
	Ok(Json(PushResponse {
		report,
		message: "updates pushed".to_string(),
	}))
}

/// Handles POST /v1/orders/{id}/cancel.
pub async fn cancel_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<OrderResponse>, ApiError> {
	let order = state
		.engine
		.cancel_order(&id)
		.await
		.map_err(map_engine_error)?;
	Ok(Json(OrderResponse {
		order,
		message: "order cancelled".to_string(),
	}))
}

/// Handles POST /v1/actions/{id}/cancel.
///
/// Office-side intervention withdrawing a single action.
pub async fn cancel_action(
	Path(id): Path<String>,
	State(state): State<AppState>,
	Json(body): Json<NoteBody>,
) -> Result<Json<OrderResponse>, ApiError> {
	let order = state
		.engine
		.cancel_action(&id, body.note)
		.await
		.map_err(map_engine_error)?;
	Ok(Json(OrderResponse {
		order,
		message: "action cancelled".to_string(),
	}))
}
