//! API types for the dispatch HTTP API.
//!
//! Request/response shapes for the office and field endpoints, plus the
//! structured API error with its HTTP status mapping.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::order::Order;
use crate::payload::ValidationIssue;
use crate::sync::PushReport;

/// Response to a draft creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDraftResponse {
	pub order_id: String,
	/// Non-fatal findings from draft validation.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub warnings: Vec<ValidationIssue>,
}

/// Generic order-bearing response used by lifecycle endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
	pub order: Order,
	pub message: String,
}

/// Response to a push request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushResponse {
	pub report: PushReport,
	pub message: String,
}

/// Proof values supplied when completing an action, keyed by rule name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProofSubmission {
	#[serde(default)]
	pub proofs: HashMap<String, String>,
}

/// Body for freeze/fail endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasonBody {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
}

/// Body for the office-side action cancellation endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteBody {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub note: Option<String>,
}

/// API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code.
	pub error: String,
	/// Human-readable description.
	pub message: String,
	/// Additional error context.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
}

/// Structured API error type with appropriate HTTP status mapping.
#[derive(Debug)]
pub enum ApiError {
	/// Malformed request or failed draft validation (400).
	BadRequest {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Referenced entity does not exist or the id is stale (404).
	NotFound { message: String },
	/// Operation attempted in the wrong lifecycle state, or a push batch
	/// partially applied (409).
	Conflict {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Completion blocked by proof validation; retryable (422).
	UnprocessableEntity {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Internal server error (500).
	InternalServerError { message: String },
}

impl ApiError {
	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			ApiError::BadRequest { .. } => 400,
			ApiError::NotFound { .. } => 404,
			ApiError::Conflict { .. } => 409,
			ApiError::UnprocessableEntity { .. } => 422,
			ApiError::InternalServerError { .. } => 500,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		match self {
			ApiError::BadRequest {
				error_type,
				message,
				details,
			} => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
				details: details.clone(),
			},
			ApiError::NotFound { message } => ErrorResponse {
				error: "NotFoundError".to_string(),
				message: message.clone(),
				details: None,
			},
			ApiError::Conflict {
				error_type,
				message,
				details,
			} => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
				details: details.clone(),
			},
			ApiError::UnprocessableEntity {
				error_type,
				message,
				details,
			} => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
				details: details.clone(),
			},
			ApiError::InternalServerError { message } => ErrorResponse {
				error: "InternalError".to_string(),
				message: message.clone(),
				details: None,
			},
		}
	}
}

impl fmt::Display for ApiError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ApiError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			ApiError::NotFound { message } => write!(f, "Not Found: {}", message),
			ApiError::Conflict { message, .. } => write!(f, "Conflict: {}", message),
			ApiError::UnprocessableEntity { message, .. } => {
				write!(f, "Unprocessable Entity: {}", message)
			},
			ApiError::InternalServerError { message } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for ApiError {}

impl axum::response::IntoResponse for ApiError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = StatusCode::from_u16(self.status_code())
			.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		let error_response = self.to_error_response();
		(status, Json(error_response)).into_response()
	}
}
