//! Core engine for the dispatch system.
//!
//! This module provides the orchestration logic for order composition
//! and synchronization: the submit/push coordinator, the lifecycle state
//! machines for orders, stops and actions, and the event bus used for
//! fire-and-forget notifications. The engine is assembled from pluggable
//! storage and routing implementations via the builder below.

use std::collections::HashMap;
use std::sync::Arc;

use dispatch_config::Config;
use dispatch_routing::{RoutingFactory, RoutingService};
use dispatch_storage::{StorageFactory, StorageService};

pub mod engine;
pub mod state;

pub use engine::event_bus::EventBus;
pub use engine::{DispatchEngine, EngineError};

/// Builder for constructing a DispatchEngine with pluggable
/// implementations.
///
/// Factories are registered by name and selected through the `primary`
/// keys of the configuration, so deployments can swap backends without
/// code changes.
pub struct DispatchBuilder {
	config: Config,
	storage_factories: HashMap<String, StorageFactory>,
	routing_factories: HashMap<String, RoutingFactory>,
}

impl DispatchBuilder {
	/// Creates a new builder with the given configuration.
	pub fn new(config: Config) -> Self {
		Self {
			config,
			storage_factories: HashMap::new(),
			routing_factories: HashMap::new(),
		}
	}

	/// Registers a factory for a storage backend.
	///
	/// The name must match an implementation name in the configuration.
	pub fn with_storage_factory(mut self, name: &str, factory: StorageFactory) -> Self {
		self.storage_factories.insert(name.to_string(), factory);
		self
	}

	/// Registers a factory for a routing backend.
	///
	/// The name must match an implementation name in the configuration.
	pub fn with_routing_factory(mut self, name: &str, factory: RoutingFactory) -> Self {
		self.routing_factories.insert(name.to_string(), factory);
		self
	}

	/// Builds the engine, instantiating the primary implementations.
	pub fn build(self) -> Result<DispatchEngine, EngineError> {
		let storage_name = self.config.storage.primary.clone();
		let storage_config = self
			.config
			.storage
			.implementations
			.get(&storage_name)
			.ok_or_else(|| {
				EngineError::Config(format!("no configuration for storage '{}'", storage_name))
			})?;
		let storage_factory = self.storage_factories.get(&storage_name).ok_or_else(|| {
			EngineError::Config(format!("no factory registered for storage '{}'", storage_name))
		})?;
		let storage_backend = storage_factory(storage_config).map_err(|e| {
			tracing::error!(
				component = "storage",
				implementation = %storage_name,
				error = %e,
				"Failed to create storage backend"
			);
			EngineError::Config(format!(
				"failed to create storage backend '{}': {}",
				storage_name, e
			))
		})?;
		let storage = Arc::new(StorageService::new(storage_backend));
		tracing::info!(component = "storage", implementation = %storage_name, "Loaded");

		let routing_name = self.config.routing.primary.clone();
		let routing_config = self
			.config
			.routing
			.implementations
			.get(&routing_name)
			.ok_or_else(|| {
				EngineError::Config(format!("no configuration for routing '{}'", routing_name))
			})?;
		let routing_factory = self.routing_factories.get(&routing_name).ok_or_else(|| {
			EngineError::Config(format!("no factory registered for routing '{}'", routing_name))
		})?;
		let routing_backend = routing_factory(routing_config).map_err(|e| {
			tracing::error!(
				component = "routing",
				implementation = %routing_name,
				error = %e,
				"Failed to create routing backend"
			);
			EngineError::Config(format!(
				"failed to create routing backend '{}': {}",
				routing_name, e
			))
		})?;
		let routing = Arc::new(RoutingService::new(routing_backend));
		tracing::info!(component = "routing", implementation = %routing_name, "Loaded");

		Ok(DispatchEngine::new(
			self.config,
			storage,
			routing,
			EventBus::new(1000),
		))
	}
}
