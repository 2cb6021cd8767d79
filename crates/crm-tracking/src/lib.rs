//! Carrier tracking module for the WrapCRM tracking system.
//!
//! This module resolves tracking numbers to delivery statuses. Providers
//! implement [`TrackingInterface`] and return loose [`RawTrackingResult`]
//! envelopes; the [`TrackingService`] is the single place those envelopes
//! are narrowed into the closed [`NormalizedStatus`] variant the rest of
//! the system consumes. The service knows nothing about orders — it maps
//! tracking numbers to carrier semantics and nothing else.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crm_types::{
	ConfigSchema, DeliveredPolicy, ImplementationRegistry, NormalizedStatus, RawTrackingResult,
	TrackingEvent,
};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod fixture;
	pub mod usps_api;
	pub mod usps_web;
}

/// Case-insensitive markers that indicate a delivery-confirmation event.
const DELIVERED_MARKERS: &[&str] = &["delivered"];

/// Errors that can occur while resolving a tracking number.
///
/// Providers must surface every failure as one of these; fabricating an
/// "unknown" success is never allowed.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
	/// Network communication failure.
	#[error("Network error: {0}")]
	Network(String),
	/// The carrier did not respond within the provider's timeout.
	#[error("Timeout: {0}")]
	Timeout(String),
	/// Authentication with the carrier failed.
	#[error("Authentication error: {0}")]
	Auth(String),
	/// The carrier definitively does not know this tracking number.
	#[error("Tracking number not found: {0}")]
	NotFound(String),
	/// The carrier responded with something the provider cannot parse.
	#[error("Malformed response: {0}")]
	Malformed(String),
	/// Provider configuration is invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl ProviderError {
	/// Whether a fallback provider may be consulted after this error.
	/// `NotFound` is definitive: a scrape cannot contradict the
	/// authoritative API's answer.
	pub fn is_retryable(&self) -> bool {
		!matches!(self, ProviderError::NotFound(_))
	}
}

/// Trait defining the interface for tracking providers.
///
/// A provider resolves a tracking number against one carrier backend (the
/// official API, the public tracking page, or test fixtures) and returns
/// the carrier's answer without interpreting it.
#[async_trait]
pub trait TrackingInterface: Send + Sync {
	/// Returns the configuration schema for this provider implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Resolves a tracking number to the carrier's raw answer.
	///
	/// Implementations must bound the request with a timeout so one hung
	/// carrier call cannot stall an entire sweep.
	async fn resolve(&self, tracking_number: &str) -> Result<RawTrackingResult, ProviderError>;
}

/// Type alias for tracking provider factory functions.
pub type TrackingFactory =
	fn(&toml::Value) -> Result<Box<dyn TrackingInterface>, ProviderError>;

/// Registry trait for tracking provider implementations.
pub trait TrackingProviderRegistry: ImplementationRegistry<Factory = TrackingFactory> {}

/// Get all registered tracking provider implementations.
pub fn get_all_implementations() -> Vec<(&'static str, TrackingFactory)> {
	use implementations::{fixture, usps_api, usps_web};

	vec![
		(usps_api::Registry::NAME, usps_api::Registry::factory()),
		(usps_web::Registry::NAME, usps_web::Registry::factory()),
		(fixture::Registry::NAME, fixture::Registry::factory()),
	]
}

/// Delivery status resolver.
///
/// Holds tracking providers in configured priority order and normalizes
/// their raw results. On a retryable provider failure the next provider in
/// the chain is consulted; only when the whole chain fails does the caller
/// see `NormalizedStatus::Error`.
pub struct TrackingService {
	/// (config name, provider) pairs in fallback order.
	providers: Vec<(String, Box<dyn TrackingInterface>)>,
	/// How to treat delivered-to-agent style narration.
	policy: DeliveredPolicy,
}

impl TrackingService {
	pub fn new(
		providers: Vec<(String, Box<dyn TrackingInterface>)>,
		policy: DeliveredPolicy,
	) -> Self {
		Self { providers, policy }
	}

	/// Resolves a tracking number to a normalized status.
	///
	/// This never returns an error: provider failures are folded into
	/// `NormalizedStatus::Error`, which callers treat as "retry on a later
	/// sweep, change nothing".
	pub async fn get_status(&self, tracking_number: &str) -> NormalizedStatus {
		let mut last_error: Option<String> = None;

		for (name, provider) in &self.providers {
			match provider.resolve(tracking_number).await {
				Ok(raw) => {
					let status = normalize(&raw, self.policy);
					tracing::debug!(
						provider = %name,
						tracking_number = %tracking_number,
						status = %status,
						"Resolved tracking number"
					);
					return status;
				},
				Err(ProviderError::NotFound(_)) => {
					tracing::debug!(
						provider = %name,
						tracking_number = %tracking_number,
						"Tracking number not found"
					);
					return NormalizedStatus::NotFound;
				},
				Err(e) => {
					tracing::warn!(
						provider = %name,
						tracking_number = %tracking_number,
						error = %e,
						"Tracking provider failed, trying next"
					);
					last_error = Some(format!("{}: {}", name, e));
				},
			}
		}

		NormalizedStatus::Error {
			reason: last_error.unwrap_or_else(|| "no tracking providers configured".to_string()),
		}
	}
}

/// Narrows a raw provider envelope into a normalized status.
///
/// The most recent event by timestamp determines the verdict; when
/// timestamps are missing or tied, an event carrying a delivery marker
/// wins over a generic one. Under the strict policy a delivered verdict
/// additionally requires the provider's own status category to assert
/// completion, which filters out "delivered to agent" narration from
/// partial-delivery attempts.
pub fn normalize(raw: &RawTrackingResult, policy: DeliveredPolicy) -> NormalizedStatus {
	let category_delivered = raw
		.status_category
		.as_deref()
		.is_some_and(|c| contains_marker(c));

	let decisive = decisive_event(&raw.events);
	let narrative_delivered = decisive.is_some_and(|e| contains_marker(&e.description))
		|| raw.status_summary.as_deref().is_some_and(contains_marker);

	let delivered = match policy {
		DeliveredPolicy::Strict => category_delivered,
		DeliveredPolicy::Lenient => category_delivered || narrative_delivered,
	};

	if delivered {
		// Prefer the delivery event's own timestamp for date_delivered
		let date = raw
			.events
			.iter()
			.filter(|e| contains_marker(&e.description))
			.filter_map(|e| e.timestamp)
			.max()
			.or_else(|| decisive.and_then(|e| e.timestamp));
		NormalizedStatus::Delivered { date }
	} else {
		NormalizedStatus::InTransit
	}
}

/// Picks the event that decides the current status: latest by timestamp,
/// with delivery markers breaking ties (and deciding among untimestamped
/// events).
fn decisive_event(events: &[TrackingEvent]) -> Option<&TrackingEvent> {
	if events.is_empty() {
		return None;
	}

	let latest_ts: Option<DateTime<Utc>> = events.iter().filter_map(|e| e.timestamp).max();

	let candidates: Vec<&TrackingEvent> = match latest_ts {
		Some(ts) => events.iter().filter(|e| e.timestamp == Some(ts)).collect(),
		None => events.iter().collect(),
	};

	candidates
		.iter()
		.find(|e| contains_marker(&e.description))
		.copied()
		.or_else(|| candidates.first().copied())
}

fn contains_marker(text: &str) -> bool {
	let lower = text.to_lowercase();
	DELIVERED_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	fn event(description: &str, ts: Option<DateTime<Utc>>) -> TrackingEvent {
		TrackingEvent {
			description: description.to_string(),
			location: None,
			timestamp: ts,
		}
	}

	fn ts(secs: i64) -> DateTime<Utc> {
		Utc.timestamp_opt(secs, 0).unwrap()
	}

	fn raw(
		category: Option<&str>,
		summary: Option<&str>,
		events: Vec<TrackingEvent>,
	) -> RawTrackingResult {
		RawTrackingResult {
			tracking_number: "9400100000000000000001".to_string(),
			status_summary: summary.map(String::from),
			status_category: category.map(String::from),
			events,
			expected_delivery: None,
		}
	}

	#[test]
	fn strict_requires_status_category() {
		// Narrative says delivered to agent, but no category asserts it
		let result = raw(
			None,
			Some("Delivered to agent"),
			vec![event("Delivered, To Agent", Some(ts(200)))],
		);
		assert_eq!(
			normalize(&result, DeliveredPolicy::Strict),
			NormalizedStatus::InTransit
		);
		assert!(matches!(
			normalize(&result, DeliveredPolicy::Lenient),
			NormalizedStatus::Delivered { .. }
		));
	}

	#[test]
	fn category_delivered_wins_under_both_policies() {
		let result = raw(
			Some("DELIVERED"),
			None,
			vec![event("Delivered, In/At Mailbox", Some(ts(300)))],
		);
		assert_eq!(
			normalize(&result, DeliveredPolicy::Strict),
			NormalizedStatus::Delivered {
				date: Some(ts(300))
			}
		);
	}

	#[test]
	fn latest_event_decides() {
		// Delivery scan is older than a later "out for delivery" scan:
		// that should not happen in practice, but the latest event rules
		let result = raw(
			None,
			None,
			vec![
				event("Delivered", Some(ts(100))),
				event("Out for Delivery", Some(ts(200))),
			],
		);
		assert_eq!(
			normalize(&result, DeliveredPolicy::Lenient),
			NormalizedStatus::InTransit
		);
	}

	#[test]
	fn tie_prefers_terminal_marker() {
		let result = raw(
			None,
			None,
			vec![
				event("Arrived at Unit", Some(ts(100))),
				event("Delivered, Front Door", Some(ts(100))),
			],
		);
		assert!(matches!(
			normalize(&result, DeliveredPolicy::Lenient),
			NormalizedStatus::Delivered { .. }
		));
	}

	#[test]
	fn untimestamped_events_prefer_marker() {
		let result = raw(
			None,
			None,
			vec![event("In Transit", None), event("Delivered", None)],
		);
		assert_eq!(
			normalize(&result, DeliveredPolicy::Lenient),
			NormalizedStatus::Delivered { date: None }
		);
	}

	#[test]
	fn no_marker_means_in_transit() {
		let result = raw(
			Some("IN_TRANSIT"),
			Some("Your item departed our facility"),
			vec![event("Departed USPS Regional Facility", Some(ts(100)))],
		);
		assert_eq!(
			normalize(&result, DeliveredPolicy::Strict),
			NormalizedStatus::InTransit
		);
	}

	#[test]
	fn delivered_date_comes_from_delivery_event() {
		let result = raw(
			Some("DELIVERED"),
			None,
			vec![
				event("Out for Delivery", Some(ts(100))),
				event("Delivered, In/At Mailbox", Some(ts(150))),
			],
		);
		assert_eq!(
			normalize(&result, DeliveredPolicy::Strict),
			NormalizedStatus::Delivered {
				date: Some(ts(150))
			}
		);
	}

	mod service {
		use super::*;
		use crate::implementations::fixture::FixtureTracking;

		#[tokio::test]
		async fn fallback_on_retryable_error() {
			let failing = FixtureTracking::failing(ProviderError::Timeout("carrier slow".into()));
			let mut working = FixtureTracking::new();
			working.insert_delivered("9400X", Some(ts(500)));

			let service = TrackingService::new(
				vec![
					("usps_api".to_string(), Box::new(failing) as Box<dyn TrackingInterface>),
					("usps_web".to_string(), Box::new(working)),
				],
				DeliveredPolicy::Strict,
			);

			assert!(matches!(
				service.get_status("9400X").await,
				NormalizedStatus::Delivered { .. }
			));
		}

		#[tokio::test]
		async fn not_found_is_definitive() {
			let primary = FixtureTracking::new();
			let mut fallback = FixtureTracking::new();
			// Even though the fallback would report delivered, the primary
			// NotFound answer stands
			fallback.insert_delivered("UNKNOWN1", None);

			let service = TrackingService::new(
				vec![
					("usps_api".to_string(), Box::new(primary) as Box<dyn TrackingInterface>),
					("usps_web".to_string(), Box::new(fallback)),
				],
				DeliveredPolicy::Strict,
			);

			assert_eq!(
				service.get_status("UNKNOWN1").await,
				NormalizedStatus::NotFound
			);
		}

		#[tokio::test]
		async fn exhausted_chain_reports_error() {
			let service = TrackingService::new(
				vec![(
					"usps_api".to_string(),
					Box::new(FixtureTracking::failing(ProviderError::Network(
						"connection refused".into(),
					))) as Box<dyn TrackingInterface>,
				)],
				DeliveredPolicy::Strict,
			);

			match service.get_status("9400X").await {
				NormalizedStatus::Error { reason } => {
					assert!(reason.contains("connection refused"))
				},
				other => panic!("expected error, got {:?}", other),
			}
		}
	}
}
