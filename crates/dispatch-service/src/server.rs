//! HTTP server for the dispatch API.
//!
//! Routes the office-side composition endpoints and the field-side
//! mission endpoints onto the engine.

use axum::{
	routing::{get, post},
	Router,
};
use dispatch_config::ApiConfig;
use dispatch_core::DispatchEngine;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::apis::{field, office};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Reference to the engine for processing requests.
	pub engine: Arc<DispatchEngine>,
}

/// Starts the HTTP server for the API.
///
/// This function creates and configures the HTTP server with routing,
/// middleware, and error handling for all endpoints.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<DispatchEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app_state = AppState { engine };

	let app = Router::new()
		.nest(
			"/v1",
			Router::new()
				// Office: composition and synchronization
				.route("/orders", post(office::create_draft))
				.route("/orders/{id}", get(office::get_order))
				.route("/orders/{id}/submit", post(office::submit))
				.route("/orders/{id}/edits", post(office::stage_edit))
				.route("/orders/{id}/push-updates", post(office::push))
				.route("/orders/{id}/cancel", post(office::cancel_order))
				.route("/actions/{id}/cancel", post(office::cancel_action))
				// Field: mission engagement and lifecycle
				.route("/missions", get(field::list_missions))
				.route("/missions/{id}/accept", post(field::accept_mission))
				.route("/missions/{id}/refuse", post(field::refuse_mission))
				.route("/missions/{id}/finish", post(field::finish_order))
				.route("/missions/{id}/fail", post(field::fail_order))
				.route("/stops/{id}/arrival", post(field::arrive_at_stop))
				.route("/stops/{id}/freeze", post(field::freeze_stop))
				.route("/stops/{id}/unfreeze", post(field::unfreeze_stop))
				.route("/stops/{id}/complete", post(field::complete_stop))
				.route("/stops/{id}/fail", post(field::fail_stop))
				.route("/actions/{id}/complete", post(field::complete_action))
				.route("/actions/{id}/freeze", post(field::freeze_action))
				.route("/actions/{id}/unfreeze", post(field::unfreeze_action))
				.route("/actions/{id}/fail", post(field::fail_action)),
		)
		.layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
		.with_state(app_state);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Dispatch API server starting on {}", bind_address);

	axum::serve(listener, app)
		.with_graceful_shutdown(async {
			let _ = tokio::signal::ctrl_c().await;
			tracing::info!("Shutdown signal received");
		})
		.await?;

	Ok(())
}
