//! Configuration module for the WrapCRM tracking service.
//!
//! Provides the typed configuration loaded from TOML, with support for
//! modular includes and environment-variable substitution, plus semantic
//! validation to catch broken deployments before the service starts.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other files
//! - Each top-level section must be unique across all files

mod loader;

use crm_types::DeliveredPolicy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error during configuration validation.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration for the tracking service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Instance-level settings.
	pub crm: CrmConfig,
	/// Order store backend selection and per-backend settings.
	pub storage: StorageConfig,
	/// Tracking provider chain and resolver policy.
	pub tracking: TrackingConfig,
	/// Mail collaborator selection and notification settings.
	pub notification: NotificationConfig,
	/// Delivery sweep pacing.
	#[serde(default)]
	pub sweep: SweepConfig,
	/// Optional HTTP trigger API.
	pub api: Option<ApiConfig>,
}

/// Instance-level settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrmConfig {
	/// Unique identifier for this service instance.
	pub id: String,
}

/// Configuration for the order store backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their raw configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for tracking providers and the status resolver.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackingConfig {
	/// Provider names in fallback order: the resolver tries each in turn
	/// when the previous one fails with a retryable error.
	pub priority: Vec<String>,
	/// How to interpret ambiguous delivered-to-agent narration.
	#[serde(default)]
	pub delivered_policy: DeliveredPolicy,
	/// Map of provider implementation names to their raw configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for customer notifications.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
	/// Which mailer implementation to use.
	pub primary: String,
	/// Sender address handed to the mail collaborator.
	pub from_address: String,
	/// Map of mailer implementation names to their raw configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Pacing for the delivery sweep.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SweepConfig {
	/// Scheduler interval between automatic sweeps.
	#[serde(default = "default_sweep_interval")]
	pub interval_seconds: u64,
	/// Politeness pause between carrier calls within one sweep.
	#[serde(default = "default_sweep_pause_ms")]
	pub pause_ms: u64,
	/// Soft budget for a whole sweep; exceeding it stops the sweep early
	/// with a partial report.
	#[serde(default = "default_sweep_budget")]
	pub budget_seconds: u64,
}

impl Default for SweepConfig {
	fn default() -> Self {
		Self {
			interval_seconds: default_sweep_interval(),
			pause_ms: default_sweep_pause_ms(),
			budget_seconds: default_sweep_budget(),
		}
	}
}

fn default_sweep_interval() -> u64 {
	3600 // Hourly, matching carrier politeness expectations
}

fn default_sweep_pause_ms() -> u64 {
	500
}

fn default_sweep_budget() -> u64 {
	300
}

/// Configuration for the HTTP trigger API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable.
/// Supports default values with ${VAR_NAME:-default_value}.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	// Bound input size so a hostile config cannot stall the regex
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let full_match = cap.get(0).unwrap();
		let var_name = cap.get(1).unwrap().as_str();
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name) {
			Ok(v) => v,
			Err(_) => match default_value {
				Some(default) => default.to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name
					)))
				},
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, resolving includes and environment
	/// variables, then validates it.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		let config = loader.load_config(file_name).await?;
		config.validate()?;
		Ok(config)
	}

	/// Parses configuration from a TOML string and validates it.
	/// Primarily used by tests.
	pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
		content.parse()
	}

	/// Validates semantic constraints across all sections.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.crm.id.is_empty() {
			return Err(ConfigError::Validation("crm id cannot be empty".into()));
		}

		// Storage: primary must resolve to a configured implementation
		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}

		// Tracking: every priority entry must resolve
		if self.tracking.priority.is_empty() {
			return Err(ConfigError::Validation(
				"Tracking priority list cannot be empty".into(),
			));
		}
		for name in &self.tracking.priority {
			if !self.tracking.implementations.contains_key(name) {
				return Err(ConfigError::Validation(format!(
					"Tracking provider '{}' in priority list not found in implementations",
					name
				)));
			}
		}

		// Notification: primary must resolve, sender must be present
		if !self
			.notification
			.implementations
			.contains_key(&self.notification.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary mailer '{}' not found in implementations",
				self.notification.primary
			)));
		}
		if self.notification.from_address.is_empty() {
			return Err(ConfigError::Validation(
				"notification from_address cannot be empty".into(),
			));
		}

		// Sweep pacing bounds
		if self.sweep.interval_seconds < 60 {
			return Err(ConfigError::Validation(
				"sweep interval_seconds must be at least 60".into(),
			));
		}
		if self.sweep.budget_seconds == 0 {
			return Err(ConfigError::Validation(
				"sweep budget_seconds must be greater than 0".into(),
			));
		}
		if self.sweep.pause_ms > 60_000 {
			return Err(ConfigError::Validation(
				"sweep pause_ms cannot exceed 60000".into(),
			));
		}

		Ok(())
	}
}

impl std::str::FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
