//! Confirmation evaluator: proof validation for action completion.
//!
//! An action's confirmation rules name the photo and code proofs the
//! driver must supply, scoped to the pickup or delivery phase. Rules with
//! `compare` set capture their pickup-phase value as a reference; the
//! delivery-phase value must then match it, exactly for codes and via an
//! opaque collaborator check for photos.

use std::collections::HashMap;

use dispatch_types::{Action, ActionKind, ConfirmationRule};

use crate::ProofError;

/// Phase a proof applies to, derived from the action's kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofPhase {
	Pickup,
	Delivery,
}

/// Scope of a captured proof value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofScope {
	Photo,
	Code,
}

/// A pickup-phase proof captured as the comparison reference.
///
/// The coordinator stores these on the matching rules of the delivery
/// actions that move the same transit item.
#[derive(Debug, Clone)]
pub struct CapturedReference {
	pub rule_name: String,
	pub scope: ProofScope,
	pub value: String,
}

/// Collaborator deciding whether two photo proofs show the same thing.
///
/// Treated as an opaque pass/fail check; similarity scoring is not the
/// engine's business.
pub trait PhotoMatcher: Send + Sync {
	fn matches(&self, reference: &str, supplied: &str) -> bool;
}

/// Byte-equality matcher, the built-in default.
pub struct ExactPhotoMatcher;

impl PhotoMatcher for ExactPhotoMatcher {
	fn matches(&self, reference: &str, supplied: &str) -> bool {
		reference == supplied
	}
}

/// Validates supplied proofs against an action's confirmation rules.
pub struct ConfirmationEvaluator {
	photo_matcher: Box<dyn PhotoMatcher>,
}

impl Default for ConfirmationEvaluator {
	fn default() -> Self {
		Self::new(Box::new(ExactPhotoMatcher))
	}
}

impl ConfirmationEvaluator {
	pub fn new(photo_matcher: Box<dyn PhotoMatcher>) -> Self {
		Self { photo_matcher }
	}

	/// Accepts or rejects the proofs supplied for completing `action`.
	///
	/// On acceptance, returns the pickup-phase values captured for
	/// `compare` rules so the coordinator can store them as references.
	/// Service actions require no proofs.
	pub fn evaluate(
		&self,
		action: &Action,
		proofs: &HashMap<String, String>,
	) -> Result<Vec<CapturedReference>, ProofError> {
		let phase = match action.kind {
			ActionKind::Pickup => ProofPhase::Pickup,
			ActionKind::Delivery => ProofPhase::Delivery,
			ActionKind::Service => return Ok(Vec::new()),
		};

		let mut captured = Vec::new();

		for rule in &action.confirmation_rules.photo {
			if let Some(value) = self.check_rule(rule, phase, ProofScope::Photo, proofs)? {
				captured.push(CapturedReference {
					rule_name: rule.name.clone(),
					scope: ProofScope::Photo,
					value,
				});
			}
		}
		for rule in &action.confirmation_rules.code {
			if let Some(value) = self.check_rule(rule, phase, ProofScope::Code, proofs)? {
				captured.push(CapturedReference {
					rule_name: rule.name.clone(),
					scope: ProofScope::Code,
					value,
				});
			}
		}

		Ok(captured)
	}

	/// Checks one rule; returns the value to capture as a reference, if
	/// any.
	fn check_rule(
		&self,
		rule: &ConfirmationRule,
		phase: ProofPhase,
		scope: ProofScope,
		proofs: &HashMap<String, String>,
	) -> Result<Option<String>, ProofError> {
		let applicable = match phase {
			ProofPhase::Pickup => rule.pickup,
			ProofPhase::Delivery => rule.delivery,
		};
		if !applicable {
			return Ok(None);
		}

		let value = proofs
			.get(&rule.name)
			.filter(|v| !v.trim().is_empty())
			.ok_or_else(|| ProofError::MissingProof {
				rule: rule.name.clone(),
			})?;

		if phase == ProofPhase::Delivery && rule.compare {
			let reference =
				rule.reference
					.as_deref()
					.ok_or_else(|| ProofError::ReferenceMissing {
						rule: rule.name.clone(),
					})?;
			let matches = match scope {
				ProofScope::Code => reference == value,
				ProofScope::Photo => self.photo_matcher.matches(reference, value),
			};
			if !matches {
				return Err(ProofError::Mismatch {
					rule: rule.name.clone(),
				});
			}
		}

		if phase == ProofPhase::Pickup && rule.compare {
			return Ok(Some(value.clone()));
		}
		Ok(None)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use dispatch_types::ConfirmationRules;

	fn code_action(kind: ActionKind, reference: Option<&str>) -> Action {
		let mut action = Action::new(kind);
		action.confirmation_rules = ConfirmationRules {
			photo: vec![],
			code: vec![ConfirmationRule {
				name: "otp".into(),
				pickup: true,
				delivery: true,
				compare: true,
				reference: reference.map(|r| r.to_string()),
			}],
		};
		action
	}

	fn proofs(value: &str) -> HashMap<String, String> {
		HashMap::from([("otp".to_string(), value.to_string())])
	}

	#[test]
	fn pickup_captures_reference() {
		let evaluator = ConfirmationEvaluator::default();
		let action = code_action(ActionKind::Pickup, None);

		let captured = evaluator.evaluate(&action, &proofs("4471")).unwrap();
		assert_eq!(captured.len(), 1);
		assert_eq!(captured[0].rule_name, "otp");
		assert_eq!(captured[0].value, "4471");
	}

	#[test]
	fn delivery_with_wrong_code_is_rejected() {
		let evaluator = ConfirmationEvaluator::default();
		let action = code_action(ActionKind::Delivery, Some("4471"));

		let err = evaluator.evaluate(&action, &proofs("0000")).unwrap_err();
		assert!(matches!(err, ProofError::Mismatch { .. }));
	}

	#[test]
	fn delivery_with_matching_code_is_accepted() {
		let evaluator = ConfirmationEvaluator::default();
		let action = code_action(ActionKind::Delivery, Some("4471"));

		let captured = evaluator.evaluate(&action, &proofs("4471")).unwrap();
		// Nothing new to capture at delivery time.
		assert!(captured.is_empty());
	}

	#[test]
	fn missing_required_proof_is_rejected() {
		let evaluator = ConfirmationEvaluator::default();
		let action = code_action(ActionKind::Pickup, None);

		let err = evaluator.evaluate(&action, &HashMap::new()).unwrap_err();
		assert!(matches!(err, ProofError::MissingProof { .. }));

		// Whitespace is not a proof.
		let err = evaluator.evaluate(&action, &proofs("  ")).unwrap_err();
		assert!(matches!(err, ProofError::MissingProof { .. }));
	}

	#[test]
	fn delivery_compare_without_reference_is_rejected() {
		let evaluator = ConfirmationEvaluator::default();
		let action = code_action(ActionKind::Delivery, None);

		let err = evaluator.evaluate(&action, &proofs("4471")).unwrap_err();
		assert!(matches!(err, ProofError::ReferenceMissing { .. }));
	}

	#[test]
	fn rule_scoped_to_other_phase_is_ignored() {
		let evaluator = ConfirmationEvaluator::default();
		let mut action = code_action(ActionKind::Delivery, None);
		action.confirmation_rules.code[0].delivery = false;

		let captured = evaluator.evaluate(&action, &HashMap::new()).unwrap();
		assert!(captured.is_empty());
	}

	#[test]
	fn service_actions_need_no_proofs() {
		let evaluator = ConfirmationEvaluator::default();
		let action = Action::new(ActionKind::Service);
		assert!(evaluator.evaluate(&action, &HashMap::new()).unwrap().is_empty());
	}
}
