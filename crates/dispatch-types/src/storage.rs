//! Storage-related types for the dispatch system.

use std::str::FromStr;

/// Storage keys for different data collections.
///
/// This enum provides type safety for storage operations by replacing
/// string literals with strongly typed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Key for the authoritative execution records.
	Orders,
	/// Key for staged pending-change overlays.
	Overlays,
	/// Key for mapping stop/action ids to their order id.
	EntityIndex,
	/// Key for the flat index of all order ids.
	OrderIndex,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::Overlays => "overlays",
			StorageKey::EntityIndex => "entity_index",
			StorageKey::OrderIndex => "order_index",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Orders,
			Self::Overlays,
			Self::EntityIndex,
			Self::OrderIndex,
		]
		.into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"orders" => Ok(Self::Orders),
			"overlays" => Ok(Self::Overlays),
			"entity_index" => Ok(Self::EntityIndex),
			"order_index" => Ok(Self::OrderIndex),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}
