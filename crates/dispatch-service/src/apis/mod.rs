//! API handler modules and the engine-to-HTTP error mapping.

pub mod field;
pub mod office;

use dispatch_core::EngineError;
use dispatch_types::ApiError;

/// Maps engine errors onto the HTTP error taxonomy.
///
/// Validation problems are client-fixable (400), state problems require
/// a refresh (409), push conflicts carry the partial-application report
/// (409), and proof failures are retryable (422).
pub fn map_engine_error(err: EngineError) -> ApiError {
	match err {
		EngineError::Validation(issues) => ApiError::BadRequest {
			error_type: "ValidationError".to_string(),
			message: "validation failed".to_string(),
			details: serde_json::to_value(issues).ok(),
		},
		EngineError::InvalidState(message) => ApiError::Conflict {
			error_type: "InvalidStateError".to_string(),
			message,
			details: None,
		},
		EngineError::NotFound(id) => ApiError::NotFound {
			message: format!("entity not found: {}", id),
		},
		EngineError::PushConflict { report } => ApiError::Conflict {
			error_type: "PushConflictError".to_string(),
			message: format!(
				"push applied with {} dropped edit(s)",
				report.conflicts.len()
			),
			details: serde_json::to_value(report).ok(),
		},
		EngineError::Proof(err) => ApiError::UnprocessableEntity {
			error_type: "ProofValidationError".to_string(),
			message: err.to_string(),
			details: None,
		},
		EngineError::Storage(message)
		| EngineError::Routing(message)
		| EngineError::Config(message) => {
			tracing::error!(error = %message, "Internal engine failure");
			ApiError::InternalServerError {
				message: "internal error".to_string(),
			}
		},
	}
}
