//! Configuration module for the dispatch system.
//!
//! This module provides structures and utilities for managing engine
//! configuration. It supports loading configuration from TOML files,
//! resolving `${ENV_VAR}` placeholders, and validating that all required
//! configuration values are properly set.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the dispatch engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Configuration specific to this engine instance.
	pub dispatch: DispatchConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// Configuration for the routing collaborator.
	pub routing: RoutingConfig,
	/// Configuration for the HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Configuration specific to the engine instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
	/// Unique identifier for this engine instance.
	pub id: String,
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the routing collaborator.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutingConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of routing implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server should be started.
	#[serde(default = "default_api_enabled")]
	pub enabled: bool,
	/// Host address to bind to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to listen on.
	#[serde(default = "default_api_port")]
	pub port: u16,
}

fn default_api_enabled() -> bool {
	true
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3333
}

/// Resolves `${VAR}` and `${VAR:-default}` placeholders against the
/// process environment.
///
/// A placeholder without a default for a variable that is not set is an
/// error, so missing configuration fails loudly at startup.
fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
		.map_err(|e| ConfigError::Parse(e.to_string()))?;

	let mut result = String::with_capacity(input.len());
	let mut last_end = 0;

	for caps in re.captures_iter(input) {
		let whole = caps.get(0).unwrap();
		let name = &caps[1];
		let default = caps.get(2).map(|m| m.as_str().to_string());

		let value = match std::env::var(name) {
			Ok(v) => v,
			Err(_) => default.ok_or_else(|| {
				ConfigError::Parse(format!("Environment variable {} is not set", name))
			})?,
		};

		result.push_str(&input[last_end..whole.start()]);
		result.push_str(&value);
		last_end = whole.end();
	}
	result.push_str(&input[last_end..]);

	Ok(result)
}

impl Config {
	/// Parses configuration from a TOML string.
	pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
		let resolved = resolve_env_vars(raw)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}

	/// Loads and validates configuration from a file.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let raw = tokio::fs::read_to_string(path).await?;
		Self::from_toml_str(&raw)
	}

	/// Validates cross-field constraints the type system cannot express.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.dispatch.id.trim().is_empty() {
			return Err(ConfigError::Validation(
				"dispatch.id must not be empty".to_string(),
			));
		}

		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"storage.primary '{}' has no matching implementation section",
				self.storage.primary
			)));
		}

		if !self
			.routing
			.implementations
			.contains_key(&self.routing.primary)
		{
			return Err(ConfigError::Validation(format!(
				"routing.primary '{}' has no matching implementation section",
				self.routing.primary
			)));
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const BASE_CONFIG: &str = r#"
[dispatch]
id = "dispatch-test"

[storage]
primary = "memory"
[storage.implementations.memory]

[routing]
primary = "haversine"
[routing.implementations.haversine]
speed_mps = 10.0

[api]
enabled = true
host = "127.0.0.1"
port = 3333
"#;

	#[test]
	fn test_parse_valid_config() {
		let config = Config::from_toml_str(BASE_CONFIG).unwrap();
		assert_eq!(config.dispatch.id, "dispatch-test");
		assert_eq!(config.storage.primary, "memory");
		assert_eq!(config.api.unwrap().port, 3333);
	}

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("TEST_DISPATCH_HOST", "localhost");
		std::env::set_var("TEST_DISPATCH_PORT", "5432");

		let input = "host = \"${TEST_DISPATCH_HOST}:${TEST_DISPATCH_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "host = \"localhost:5432\"");

		std::env::remove_var("TEST_DISPATCH_HOST");
		std::env::remove_var("TEST_DISPATCH_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${MISSING_DISPATCH_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${MISSING_DISPATCH_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.is_err());
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("MISSING_DISPATCH_VAR"));
	}

	#[test]
	fn test_primary_without_implementation_rejected() {
		let raw = r#"
[dispatch]
id = "dispatch-test"

[storage]
primary = "postgres"
[storage.implementations.memory]

[routing]
primary = "haversine"
[routing.implementations.haversine]
"#;
		let result = Config::from_toml_str(raw);
		assert!(matches!(result, Err(ConfigError::Validation(_))));
	}

	#[test]
	fn test_empty_id_rejected() {
		let raw = BASE_CONFIG.replace("dispatch-test", " ");
		let result = Config::from_toml_str(&raw);
		assert!(matches!(result, Err(ConfigError::Validation(_))));
	}

	#[tokio::test]
	async fn test_from_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.toml");
		std::fs::write(&path, BASE_CONFIG).unwrap();

		let config = Config::from_file(path.to_str().unwrap()).await.unwrap();
		assert_eq!(config.routing.primary, "haversine");
	}
}
