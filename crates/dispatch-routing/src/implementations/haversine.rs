//! Great-circle routing backend.
//!
//! Computes legs as haversine distances between consecutive waypoints and
//! derives durations from a configured average speed. The geometry is the
//! waypoint polyline itself. Useful as a development stand-in for a real
//! routing provider and for tests.

use crate::{RoutingError, RoutingInterface, Waypoint};
use async_trait::async_trait;
use dispatch_types::{RouteLeg, RoutePlan};

/// Mean earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Routing backend based on straight-line distances.
pub struct HaversineRouting {
	/// Assumed travel speed in meters per second.
	speed_mps: f64,
}

impl HaversineRouting {
	pub fn new(speed_mps: f64) -> Self {
		Self { speed_mps }
	}
}

/// Haversine distance between two (lat, lng) points, in meters.
fn haversine_meters(from: Waypoint, to: Waypoint) -> f64 {
	let (lat1, lng1) = (from.0.to_radians(), from.1.to_radians());
	let (lat2, lng2) = (to.0.to_radians(), to.1.to_radians());

	let dlat = lat2 - lat1;
	let dlng = lng2 - lng1;

	let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
	let c = 2.0 * a.sqrt().asin();

	EARTH_RADIUS_M * c
}

#[async_trait]
impl RoutingInterface for HaversineRouting {
	async fn compute_route(&self, waypoints: &[Waypoint]) -> Result<RoutePlan, RoutingError> {
		if waypoints.len() < 2 {
			return Err(RoutingError::NotEnoughWaypoints(waypoints.len()));
		}

		let legs: Vec<RouteLeg> = waypoints
			.windows(2)
			.map(|pair| {
				let distance = haversine_meters(pair[0], pair[1]);
				RouteLeg {
					distance_meters: distance,
					duration_seconds: distance / self.speed_mps,
				}
			})
			.collect();

		// Geometry is stored as [lng, lat] pairs, GeoJSON-style.
		let geometry = waypoints.iter().map(|(lat, lng)| [*lng, *lat]).collect();

		Ok(RoutePlan { geometry, legs })
	}
}

/// Factory function to create a haversine routing backend from configuration.
///
/// Configuration parameters:
/// - `speed_mps`: Assumed travel speed in meters per second (default: 8.0)
pub fn create_routing(config: &toml::Value) -> Result<Box<dyn RoutingInterface>, RoutingError> {
	let speed_mps = config
		.get("speed_mps")
		.and_then(|v| v.as_float().or_else(|| v.as_integer().map(|i| i as f64)))
		.unwrap_or(8.0);

	if speed_mps <= 0.0 {
		return Err(RoutingError::Configuration(
			"speed_mps must be positive".to_string(),
		));
	}

	Ok(Box::new(HaversineRouting::new(speed_mps)))
}

#[cfg(test)]
mod tests {
	use super::*;

	// Paris and London city centers, roughly 343 km apart.
	const PARIS: Waypoint = (48.8566, 2.3522);
	const LONDON: Waypoint = (51.5074, -0.1278);

	#[test]
	fn test_haversine_distance() {
		let d = haversine_meters(PARIS, LONDON);
		assert!((d - 343_500.0).abs() < 2_000.0, "got {}", d);
	}

	#[test]
	fn test_zero_distance() {
		assert_eq!(haversine_meters(PARIS, PARIS), 0.0);
	}

	#[tokio::test]
	async fn test_route_has_one_leg_per_pair() {
		let routing = HaversineRouting::new(10.0);
		let route = routing
			.compute_route(&[PARIS, LONDON, PARIS])
			.await
			.unwrap();

		assert_eq!(route.legs.len(), 2);
		assert_eq!(route.geometry.len(), 3);
		// Geometry is [lng, lat].
		assert!((route.geometry[0][0] - PARIS.1).abs() < f64::EPSILON);
		// Duration follows from the configured speed.
		let leg = &route.legs[0];
		assert!((leg.duration_seconds - leg.distance_meters / 10.0).abs() < 1e-9);
	}

	#[tokio::test]
	async fn test_single_waypoint_rejected() {
		let routing = HaversineRouting::new(10.0);
		let result = routing.compute_route(&[PARIS]).await;
		assert!(matches!(result, Err(RoutingError::NotEnoughWaypoints(1))));
	}
}
