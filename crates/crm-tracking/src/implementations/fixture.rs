//! Deterministic fixture tracking provider.
//!
//! Resolves tracking numbers from an in-memory table instead of a carrier,
//! making sweeps fully reproducible in tests and local development. Numbers
//! following the `TEST_*` naming convention get canned answers without any
//! setup:
//!
//! - `TEST_DELIVERED_*` — delivered, with a delivery scan event
//! - `TEST_INTRANSIT_*` — accepted and moving
//! - `TEST_NOTFOUND_*`  — carrier does not know the number
//! - `TEST_ERROR_*`     — provider timeout

use crate::{ProviderError, TrackingFactory, TrackingInterface, TrackingProviderRegistry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crm_types::{
	ConfigSchema, ImplementationRegistry, RawTrackingResult, Schema, TrackingEvent,
	ValidationError,
};
use std::collections::HashMap;
use std::sync::Mutex;

/// Fixture-backed tracking provider.
pub struct FixtureTracking {
	entries: Mutex<HashMap<String, RawTrackingResult>>,
	/// When set, every resolve call fails with a clone of this error.
	fail_with: Option<ProviderError>,
}

impl FixtureTracking {
	pub fn new() -> Self {
		Self {
			entries: Mutex::new(HashMap::new()),
			fail_with: None,
		}
	}

	/// A provider that fails every call; used to exercise fallback and
	/// sweep isolation paths.
	pub fn failing(error: ProviderError) -> Self {
		Self {
			entries: Mutex::new(HashMap::new()),
			fail_with: Some(error),
		}
	}

	/// Registers a custom raw result for a tracking number.
	pub fn insert(&mut self, tracking_number: &str, result: RawTrackingResult) {
		self.entries
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.insert(tracking_number.to_string(), result);
	}

	/// Registers a delivered fixture with the carrier status category set,
	/// so it passes the strict delivered policy.
	pub fn insert_delivered(&mut self, tracking_number: &str, date: Option<DateTime<Utc>>) {
		self.insert(tracking_number, delivered_result(tracking_number, date));
	}

	/// Registers an in-transit fixture.
	pub fn insert_in_transit(&mut self, tracking_number: &str) {
		self.insert(tracking_number, in_transit_result(tracking_number));
	}
}

impl Default for FixtureTracking {
	fn default() -> Self {
		Self::new()
	}
}

fn delivered_result(tracking_number: &str, date: Option<DateTime<Utc>>) -> RawTrackingResult {
	RawTrackingResult {
		tracking_number: tracking_number.to_string(),
		status_summary: Some("Your item was delivered.".to_string()),
		status_category: Some("DELIVERED".to_string()),
		events: vec![TrackingEvent {
			description: "Delivered, In/At Mailbox".to_string(),
			location: Some("SPRINGFIELD, IL 62704".to_string()),
			timestamp: date,
		}],
		expected_delivery: None,
	}
}

fn in_transit_result(tracking_number: &str) -> RawTrackingResult {
	RawTrackingResult {
		tracking_number: tracking_number.to_string(),
		status_summary: Some("Your item is in transit to the destination.".to_string()),
		status_category: Some("IN_TRANSIT".to_string()),
		events: vec![TrackingEvent {
			description: "Departed USPS Regional Facility".to_string(),
			location: Some("CHICAGO IL DISTRIBUTION CENTER".to_string()),
			timestamp: None,
		}],
		expected_delivery: None,
	}
}

#[async_trait]
impl TrackingInterface for FixtureTracking {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FixtureTrackingSchema)
	}

	async fn resolve(&self, tracking_number: &str) -> Result<RawTrackingResult, ProviderError> {
		if let Some(error) = &self.fail_with {
			return Err(error.clone());
		}

		if let Some(result) = self
			.entries
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.get(tracking_number)
		{
			return Ok(result.clone());
		}

		// Convention-named test numbers
		if tracking_number.starts_with("TEST_DELIVERED_") {
			return Ok(delivered_result(tracking_number, Some(Utc::now())));
		}
		if tracking_number.starts_with("TEST_INTRANSIT_") {
			return Ok(in_transit_result(tracking_number));
		}
		if tracking_number.starts_with("TEST_ERROR_") {
			return Err(ProviderError::Timeout(
				"fixture: simulated carrier timeout".to_string(),
			));
		}

		Err(ProviderError::NotFound(tracking_number.to_string()))
	}
}

/// Configuration schema for the fixture provider.
pub struct FixtureTrackingSchema;

impl ConfigSchema for FixtureTrackingSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		// No configuration required
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Registry for the fixture provider.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "fixture";
	type Factory = TrackingFactory;

	fn factory() -> Self::Factory {
		create_provider
	}
}

impl TrackingProviderRegistry for Registry {}

/// Factory function to create a fixture provider from configuration.
pub fn create_provider(
	_config: &toml::Value,
) -> Result<Box<dyn TrackingInterface>, ProviderError> {
	Ok(Box::new(FixtureTracking::new()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn convention_numbers_resolve() {
		let provider = FixtureTracking::new();

		let delivered = provider.resolve("TEST_DELIVERED_001").await.unwrap();
		assert_eq!(delivered.status_category.as_deref(), Some("DELIVERED"));

		let in_transit = provider.resolve("TEST_INTRANSIT_001").await.unwrap();
		assert_eq!(in_transit.status_category.as_deref(), Some("IN_TRANSIT"));

		assert!(matches!(
			provider.resolve("TEST_ERROR_001").await,
			Err(ProviderError::Timeout(_))
		));
		assert!(matches!(
			provider.resolve("TEST_NOTFOUND_001").await,
			Err(ProviderError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn custom_entries_override_conventions() {
		let mut provider = FixtureTracking::new();
		provider.insert_in_transit("TEST_DELIVERED_001");

		let result = provider.resolve("TEST_DELIVERED_001").await.unwrap();
		assert_eq!(result.status_category.as_deref(), Some("IN_TRANSIT"));
	}

	#[tokio::test]
	async fn unknown_numbers_are_not_found() {
		let provider = FixtureTracking::new();
		assert!(matches!(
			provider.resolve("9400100000000000000001").await,
			Err(ProviderError::NotFound(_))
		));
	}
}
