//! Lifecycle state machines for orders, stops and actions.
//!
//! Each machine validates transitions against a static table and appends
//! a status-history entry on every accepted transition. History is
//! append-only; no transition rewrites it.

pub mod action;
pub mod order;
pub mod stop;

use thiserror::Error;

/// Errors raised by the lifecycle state machines.
#[derive(Debug, Error)]
pub enum StateError {
	/// The requested transition is not in the machine's table.
	#[error("invalid transition from {from} to {to}")]
	InvalidTransition { from: String, to: String },
	/// A guard condition blocked an otherwise valid transition.
	#[error("{0}")]
	GuardViolation(String),
}
