//! Main entry point for the dispatch service.
//!
//! This binary wires the order composition and synchronization engine to
//! its storage and routing backends and serves the office and field HTTP
//! APIs. Backends are pluggable and selected through the configuration
//! file.

use clap::Parser;
use dispatch_config::Config;
use dispatch_core::{DispatchBuilder, DispatchEngine};
use std::path::PathBuf;
use std::sync::Arc;

mod apis;
mod server;

/// Command-line arguments for the dispatch service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

/// Main entry point for the dispatch service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Builds the engine with all registered implementations
/// 5. Serves the HTTP API until interrupted
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt().with_env_filter(env_filter).with_target(true).init();

	tracing::info!("Started dispatch service");

	// Load configuration
	let config = Config::from_file(
		args.config
			.to_str()
			.ok_or("configuration path is not valid UTF-8")?,
	)
	.await?;
	tracing::info!("Loaded configuration [{}]", config.dispatch.id);

	let engine = Arc::new(build_engine(config.clone())?);

	// Log engine events; the real-time channel transport is out of
	// scope, so the bus consumer here just traces refresh triggers.
	spawn_event_logger(&engine);

	let api_config = match &config.api {
		Some(api) if api.enabled => api.clone(),
		_ => {
			tracing::warn!("API server disabled in configuration, nothing to serve");
			return Ok(());
		},
	};

	server::start_server(api_config, engine).await?;

	tracing::info!("Stopped dispatch service");
	Ok(())
}

/// Assembles the engine with all bundled backend implementations.
fn build_engine(config: Config) -> Result<DispatchEngine, dispatch_core::EngineError> {
	let mut builder = DispatchBuilder::new(config);

	for (name, factory) in dispatch_storage::get_all_implementations() {
		builder = builder.with_storage_factory(name, factory);
	}
	for (name, factory) in dispatch_routing::get_all_implementations() {
		builder = builder.with_routing_factory(name, factory);
	}

	builder.build()
}

/// Subscribes to the event bus and traces every event.
fn spawn_event_logger(engine: &Arc<DispatchEngine>) {
	let mut events = engine.event_bus().subscribe();
	tokio::spawn(async move {
		while let Ok(event) = events.recv().await {
			tracing::debug!(?event, "Engine event");
		}
	});
}
