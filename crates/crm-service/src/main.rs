//! Main entry point for the WrapCRM service.
//!
//! This binary wires the order store, USPS tracking providers, mailer and
//! delivery sweeper together from a TOML configuration, then runs the sweep
//! scheduler and (optionally) the HTTP API until interrupted.

use clap::Parser;
use crm_config::Config;
use crm_core::{Crm, CrmBuilder, CrmFactories};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod scheduler;
mod server;

// Import implementations from individual crates
use crm_notify::implementations::http::create_mailer as create_http_mailer;
use crm_notify::implementations::log::create_mailer as create_log_mailer;
use crm_storage::implementations::file::create_storage as create_file_storage;
use crm_storage::implementations::memory::create_storage as create_memory_storage;
use crm_tracking::implementations::fixture::create_provider as create_fixture_provider;
use crm_tracking::implementations::usps_api::create_provider as create_usps_api_provider;
use crm_tracking::implementations::usps_web::create_provider as create_usps_web_provider;

/// Command-line arguments for the CRM service.
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

/// Main entry point for the CRM service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Builds the CRM with all implementations
/// 5. Runs the sweep scheduler (and API server when enabled) until interrupted
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started WrapCRM");

	// Load configuration
	let config_path = args.config.to_string_lossy().to_string();
	let config = Config::from_file(&config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.crm.id);

	let crm = Arc::new(build_crm(config)?);

	let interval = Duration::from_secs(crm.config().sweep.interval_seconds);
	let scheduler = scheduler::SweepScheduler::new(crm.sweeper().clone(), interval);

	// Check if API server should be started
	let api_config = crm
		.config()
		.api
		.as_ref()
		.filter(|api| api.enabled)
		.cloned();

	if let Some(api_config) = api_config {
		let api_crm = Arc::clone(&crm);

		tokio::select! {
			_ = scheduler.run() => {
				tracing::info!("Scheduler finished");
			}
			result = server::start_server(api_config, api_crm) => {
				tracing::info!("API server finished");
				result?;
			}
			_ = tokio::signal::ctrl_c() => {
				tracing::info!("Received shutdown signal");
			}
		}
	} else {
		tracing::info!("Starting scheduler only");
		tokio::select! {
			_ = scheduler.run() => {
				tracing::info!("Scheduler finished");
			}
			_ = tokio::signal::ctrl_c() => {
				tracing::info!("Received shutdown signal");
			}
		}
	}

	tracing::info!("Stopped WrapCRM");
	Ok(())
}

/// Macro to create a factory HashMap with the appropriate type aliases
macro_rules! create_factory_map {
    ($interface:path, $error:path, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};
}

/// Builds the CRM with all necessary implementations.
///
/// This function wires up the concrete implementations for:
/// - Storage backends (file, in-memory)
/// - Tracking providers (USPS API, USPS web page, test fixture)
/// - Mailers (HTTP mail API, log-only)
fn build_crm(config: Config) -> Result<Crm, Box<dyn std::error::Error>> {
	let builder = CrmBuilder::new(config);

	let storage_factories = create_factory_map!(
		crm_storage::StorageInterface,
		crm_storage::StorageError,
		"file" => create_file_storage,
		"memory" => create_memory_storage,
	);

	let tracking_factories = create_factory_map!(
		crm_tracking::TrackingInterface,
		crm_tracking::ProviderError,
		"usps_api" => create_usps_api_provider,
		"usps_web" => create_usps_web_provider,
		"fixture" => create_fixture_provider,
	);

	let mailer_factories = create_factory_map!(
		crm_notify::MailerInterface,
		crm_notify::MailError,
		"http" => create_http_mailer,
		"log" => create_log_mailer,
	);

	let factories = CrmFactories {
		storage_factories,
		tracking_factories,
		mailer_factories,
	};

	Ok(builder.build(factories)?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	const TEST_CONFIG: &str = r#"
[crm]
id = "wrapcrm-test"

[storage]
primary = "memory"
[storage.implementations.memory]

[tracking]
priority = ["fixture"]
[tracking.implementations.fixture]

[notification]
primary = "log"
from_address = "orders@example.com"
[notification.implementations.log]

[sweep]
interval_seconds = 3600
pause_ms = 0
budget_seconds = 60

[api]
enabled = false
"#;

	#[test]
	fn test_args_default_values() {
		let args = Args {
			config: PathBuf::from("config.toml"),
			log_level: "info".to_string(),
		};

		assert_eq!(args.config, PathBuf::from("config.toml"));
		assert_eq!(args.log_level, "info");
	}

	#[test]
	fn test_create_factory_map_macro() {
		let factories = create_factory_map!(
			crm_storage::StorageInterface,
			crm_storage::StorageError,
			"memory" => create_memory_storage,
		);

		assert_eq!(factories.len(), 1);
		assert!(factories.contains_key("memory"));
	}

	#[test]
	fn test_build_crm_with_minimal_config() {
		let config = Config::from_toml_str(TEST_CONFIG).expect("config should parse");
		let crm = build_crm(config).expect("build should succeed");

		assert_eq!(crm.config().crm.id, "wrapcrm-test");
		assert_eq!(crm.config().sweep.interval_seconds, 3600);
	}

	#[tokio::test]
	async fn test_build_crm_from_config_file() {
		let dir = tempdir().expect("temp dir");
		let path = dir.path().join("config.toml");
		std::fs::write(&path, TEST_CONFIG).expect("write config");

		let config = Config::from_file(&path.to_string_lossy())
			.await
			.expect("config should load");
		assert_eq!(config.crm.id, "wrapcrm-test");
		assert!(config.api.as_ref().is_some_and(|api| !api.enabled));

		let crm = build_crm(config).expect("build should succeed");
		let report = crm.sweeper().run_sweep().await.expect("sweep should run");
		assert_eq!(report.checked, 0);
	}
}
