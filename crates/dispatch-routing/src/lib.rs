//! Routing module for the dispatch system.
//!
//! This module defines the interface to the route/ETA collaborator. The
//! engine treats route computation as a black box producing geometry and
//! per-leg distances/durations for an ordered list of stop coordinates;
//! implementations decide how those numbers are produced.

use async_trait::async_trait;
use dispatch_types::RoutePlan;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod haversine;
}

/// Errors that can occur during route computation.
#[derive(Debug, Error)]
pub enum RoutingError {
	/// Error that occurs when fewer than two waypoints are supplied.
	#[error("Not enough waypoints: {0}")]
	NotEnoughWaypoints(usize),
	/// Error that occurs in the routing backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// A routed waypoint as (lat, lng).
pub type Waypoint = (f64, f64);

/// Trait defining the interface for routing backends.
#[async_trait]
pub trait RoutingInterface: Send + Sync {
	/// Computes a route through the given waypoints, in order.
	///
	/// Returns the route geometry plus one leg per consecutive waypoint
	/// pair. Implementations must preserve waypoint order; optimization
	/// is not this collaborator's job.
	async fn compute_route(&self, waypoints: &[Waypoint]) -> Result<RoutePlan, RoutingError>;
}

/// Type alias for routing factory functions.
pub type RoutingFactory = fn(&toml::Value) -> Result<Box<dyn RoutingInterface>, RoutingError>;

/// Get all registered routing implementations.
pub fn get_all_implementations() -> Vec<(&'static str, RoutingFactory)> {
	use implementations::haversine;

	vec![("haversine", haversine::create_routing as RoutingFactory)]
}

/// High-level routing service wrapping a backend implementation.
pub struct RoutingService {
	backend: Box<dyn RoutingInterface>,
}

impl RoutingService {
	/// Creates a new RoutingService with the specified backend.
	pub fn new(backend: Box<dyn RoutingInterface>) -> Self {
		Self { backend }
	}

	/// Computes a route through the given waypoints.
	pub async fn compute_route(&self, waypoints: &[Waypoint]) -> Result<RoutePlan, RoutingError> {
		if waypoints.len() < 2 {
			return Err(RoutingError::NotEnoughWaypoints(waypoints.len()));
		}
		self.backend.compute_route(waypoints).await
	}
}
