//! Entity id generation.
//!
//! Ids are v4 UUIDs with a short entity prefix so logs and API payloads
//! stay self-describing.

use uuid::Uuid;

fn prefixed(prefix: &str) -> String {
	format!("{}_{}", prefix, Uuid::new_v4().simple())
}

pub fn order_id() -> String {
	prefixed("ord")
}

pub fn step_id() -> String {
	prefixed("stp")
}

pub fn stop_id() -> String {
	prefixed("sto")
}

pub fn action_id() -> String {
	prefixed("act")
}

pub fn item_id() -> String {
	prefixed("itm")
}

pub fn batch_id() -> String {
	prefixed("bat")
}

/// Truncates an id for display purposes.
///
/// Shows only the first 12 characters followed by ".." for longer ids.
pub fn truncate_id(id: &str) -> String {
	if id.len() <= 12 {
		id.to_string()
	} else {
		format!("{}..", &id[..12])
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ids_carry_entity_prefix() {
		assert!(order_id().starts_with("ord_"));
		assert!(stop_id().starts_with("sto_"));
		assert_ne!(action_id(), action_id());
	}

	#[test]
	fn truncation_preserves_short_ids() {
		assert_eq!(truncate_id("ord_1"), "ord_1");
		let long = truncate_id("ord_0123456789abcdef");
		assert_eq!(long, "ord_01234567..");
	}
}
