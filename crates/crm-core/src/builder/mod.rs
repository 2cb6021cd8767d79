//! Builder pattern for assembling the CRM from configuration.
//!
//! Composes the order store, tracking service, notification gate and
//! delivery sweeper from factory functions, so the binary decides which
//! storage backends, tracking providers and mailers exist and the core
//! stays free of concrete implementations.

use crate::state::OrderStateMachine;
use crate::sweep::DeliverySweeper;
use crm_config::Config;
use crm_notify::{MailError, MailerInterface, NotificationGate};
use crm_storage::{OrderStore, StorageError, StorageInterface};
use crm_tracking::{ProviderError, TrackingInterface, TrackingService};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during CRM construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Container for all factory functions needed to build a [`Crm`].
///
/// Each factory takes the implementation's TOML table and returns the
/// corresponding boxed implementation.
pub struct CrmFactories<SF, TF, MF> {
	pub storage_factories: HashMap<String, SF>,
	pub tracking_factories: HashMap<String, TF>,
	pub mailer_factories: HashMap<String, MF>,
}

/// The assembled CRM: the order store plus the delivery sweeper built on
/// top of it.
pub struct Crm {
	config: Config,
	store: Arc<OrderStore>,
	sweeper: Arc<DeliverySweeper>,
}

impl Crm {
	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn store(&self) -> &Arc<OrderStore> {
		&self.store
	}

	pub fn sweeper(&self) -> &Arc<DeliverySweeper> {
		&self.sweeper
	}
}

/// Builder for constructing a [`Crm`] with pluggable implementations.
pub struct CrmBuilder {
	config: Config,
}

impl CrmBuilder {
	/// Creates a new CrmBuilder with the given configuration.
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the CRM using factories for each component type.
	pub fn build<SF, TF, MF>(self, factories: CrmFactories<SF, TF, MF>) -> Result<Crm, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		TF: Fn(&toml::Value) -> Result<Box<dyn TrackingInterface>, ProviderError>,
		MF: Fn(&toml::Value) -> Result<Box<dyn MailerInterface>, MailError>,
	{
		let store = Arc::new(OrderStore::new(self.build_storage(&factories.storage_factories)?));
		let tracking = Arc::new(TrackingService::new(
			self.build_providers(&factories.tracking_factories)?,
			self.config.tracking.delivered_policy,
		));
		let gate = NotificationGate::new(
			store.clone(),
			self.build_mailer(&factories.mailer_factories)?,
			self.config.notification.from_address.clone(),
		);

		let sweeper = Arc::new(DeliverySweeper::new(
			store.clone(),
			tracking,
			OrderStateMachine::new(store.clone()),
			gate,
			Duration::from_millis(self.config.sweep.pause_ms),
			Duration::from_secs(self.config.sweep.budget_seconds),
		));

		Ok(Crm {
			config: self.config,
			store,
			sweeper,
		})
	}

	fn build_storage<SF>(
		&self,
		factories: &HashMap<String, SF>,
	) -> Result<Box<dyn StorageInterface>, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
	{
		let primary = &self.config.storage.primary;
		let factory = factories.get(primary).ok_or_else(|| {
			BuilderError::MissingComponent(format!("storage implementation '{}'", primary))
		})?;
		let impl_config = self
			.config
			.storage
			.implementations
			.get(primary)
			.ok_or_else(|| {
				BuilderError::Config(format!("No configuration for storage '{}'", primary))
			})?;

		let backend = factory(impl_config).map_err(|e| {
			BuilderError::Config(format!("Failed to create storage '{}': {}", primary, e))
		})?;
		tracing::info!(component = "storage", implementation = %primary, "Loaded");
		Ok(backend)
	}

	fn build_providers<TF>(
		&self,
		factories: &HashMap<String, TF>,
	) -> Result<Vec<(String, Box<dyn TrackingInterface>)>, BuilderError>
	where
		TF: Fn(&toml::Value) -> Result<Box<dyn TrackingInterface>, ProviderError>,
	{
		// Priority order from config is fallback order at runtime
		let mut providers = Vec::new();
		for name in &self.config.tracking.priority {
			let factory = factories.get(name).ok_or_else(|| {
				BuilderError::MissingComponent(format!("tracking provider '{}'", name))
			})?;
			let impl_config = self
				.config
				.tracking
				.implementations
				.get(name)
				.ok_or_else(|| {
					BuilderError::Config(format!("No configuration for tracking provider '{}'", name))
				})?;

			let provider = factory(impl_config).map_err(|e| {
				BuilderError::Config(format!(
					"Failed to create tracking provider '{}': {}",
					name, e
				))
			})?;
			tracing::info!(component = "tracking", implementation = %name, "Loaded");
			providers.push((name.clone(), provider));
		}

		if providers.is_empty() {
			return Err(BuilderError::Config(
				"No tracking providers configured".into(),
			));
		}
		Ok(providers)
	}

	fn build_mailer<MF>(
		&self,
		factories: &HashMap<String, MF>,
	) -> Result<Box<dyn MailerInterface>, BuilderError>
	where
		MF: Fn(&toml::Value) -> Result<Box<dyn MailerInterface>, MailError>,
	{
		let primary = &self.config.notification.primary;
		let factory = factories.get(primary).ok_or_else(|| {
			BuilderError::MissingComponent(format!("mailer implementation '{}'", primary))
		})?;
		let impl_config = self
			.config
			.notification
			.implementations
			.get(primary)
			.ok_or_else(|| {
				BuilderError::Config(format!("No configuration for mailer '{}'", primary))
			})?;

		let mailer = factory(impl_config).map_err(|e| {
			BuilderError::Config(format!("Failed to create mailer '{}': {}", primary, e))
		})?;
		tracing::info!(component = "notification", implementation = %primary, "Loaded");
		Ok(mailer)
	}
}
