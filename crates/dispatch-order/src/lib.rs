//! Order composition module for the dispatch system.
//!
//! This module holds the office-side composition logic: building drafts
//! into normalized creation payloads, staging edits against in-flight
//! orders through the pending-change overlay, applying staged batches to
//! the execution record, and validating completion proofs.

use thiserror::Error;

use dispatch_types::ValidationIssue;

pub mod confirmation;
pub mod draft;
pub mod overlay;
pub mod push;

pub use confirmation::{
	CapturedReference, ConfirmationEvaluator, ExactPhotoMatcher, PhotoMatcher, ProofScope,
};
pub use draft::DraftBuilder;
pub use overlay::Overlay;
pub use push::{apply_overlay, PushOutcome};

/// Errors that can occur while building a draft.
#[derive(Debug, Error)]
pub enum DraftError {
	/// The draft is malformed; the issue list names every finding.
	#[error("draft validation failed")]
	Validation(Vec<ValidationIssue>),
}

/// Errors that can occur while staging edits.
#[derive(Debug, Error)]
pub enum OverlayError {
	/// The targeted entity is not part of the staged hierarchy.
	#[error("entity not found: {0}")]
	NotFound(String),
	/// A staged pickup action carries no transit item.
	#[error("pickup action has no transit item")]
	MissingItem,
	/// A staged delivery references an unknown transit item.
	#[error("unknown transit item reference: {0}")]
	UnknownItemRef(String),
}

/// Errors that can occur during proof validation.
///
/// All variants are retryable with corrected proofs.
#[derive(Debug, Error)]
pub enum ProofError {
	/// A required proof was not supplied or was empty.
	#[error("missing required proof for rule '{rule}'")]
	MissingProof { rule: String },
	/// A compare rule has no captured pickup reference yet.
	#[error("no pickup reference captured for rule '{rule}'")]
	ReferenceMissing { rule: String },
	/// The supplied proof does not match the captured reference.
	#[error("proof for rule '{rule}' does not match the pickup reference")]
	Mismatch { rule: String },
}
