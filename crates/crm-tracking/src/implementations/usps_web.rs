//! Fallback tracking provider that scrapes the public USPS tracking page.
//!
//! Used when the official API is unavailable. The page only exposes a
//! human-readable status banner, so this provider reports a status category
//! only when the banner unambiguously says "Delivered" — narration like
//! "Delivered to Agent" stays category-less and is left to the delivered
//! policy to interpret.

use crate::{ProviderError, TrackingFactory, TrackingInterface, TrackingProviderRegistry};
use async_trait::async_trait;
use crm_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, RawTrackingResult, Schema,
	TrackingEvent, ValidationError,
};
use regex::Regex;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Web-scraping USPS tracking provider.
pub struct UspsWebTracking {
	client: reqwest::Client,
	base_url: String,
	banner_re: Regex,
	detail_re: Regex,
}

impl UspsWebTracking {
	pub fn new(client: reqwest::Client, base_url: String) -> Result<Self, ProviderError> {
		// Status banner, e.g. <strong class="tb-status">Delivered</strong>
		let banner_re = Regex::new(r#"class="tb-status"[^>]*>\s*([^<]+?)\s*<"#)
			.map_err(|e| ProviderError::Configuration(format!("Regex error: {}", e)))?;
		// Detail line under the banner with the scan narration
		let detail_re = Regex::new(r#"class="tb-status-detail"[^>]*>\s*([^<]+?)\s*<"#)
			.map_err(|e| ProviderError::Configuration(format!("Regex error: {}", e)))?;
		Ok(Self {
			client,
			base_url,
			banner_re,
			detail_re,
		})
	}

	fn parse_page(&self, tracking_number: &str, html: &str) -> Result<RawTrackingResult, ProviderError> {
		let lower = html.to_lowercase();
		if lower.contains("could not locate the tracking information")
			|| lower.contains("status not available")
		{
			return Err(ProviderError::NotFound(tracking_number.to_string()));
		}

		let banner = self
			.banner_re
			.captures(html)
			.and_then(|c| c.get(1))
			.map(|m| m.as_str().trim().to_string())
			.ok_or_else(|| {
				ProviderError::Malformed("tracking page has no status banner".to_string())
			})?;

		let detail = self
			.detail_re
			.captures(html)
			.and_then(|c| c.get(1))
			.map(|m| m.as_str().trim().to_string());

		// The page gives no machine status, so only an unqualified
		// "Delivered" banner earns the category. "Delivered to Agent"
		// and similar narration carry no category.
		let status_category = if banner.eq_ignore_ascii_case("delivered") {
			Some("DELIVERED".to_string())
		} else {
			None
		};

		let events = detail
			.iter()
			.map(|d| TrackingEvent {
				description: d.clone(),
				location: None,
				timestamp: None,
			})
			.collect();

		Ok(RawTrackingResult {
			tracking_number: tracking_number.to_string(),
			status_summary: Some(banner),
			status_category,
			events,
			expected_delivery: None,
		})
	}
}

#[async_trait]
impl TrackingInterface for UspsWebTracking {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(UspsWebSchema)
	}

	async fn resolve(&self, tracking_number: &str) -> Result<RawTrackingResult, ProviderError> {
		let response = self
			.client
			.get(format!("{}/go/TrackConfirmAction", self.base_url))
			.query(&[("tLabels", tracking_number)])
			.send()
			.await
			.map_err(|e| {
				if e.is_timeout() {
					ProviderError::Timeout(e.to_string())
				} else {
					ProviderError::Network(e.to_string())
				}
			})?;

		let status = response.status();
		if !status.is_success() {
			return Err(ProviderError::Network(format!(
				"tracking page returned {}",
				status
			)));
		}

		let html = response
			.text()
			.await
			.map_err(|e| ProviderError::Malformed(e.to_string()))?;

		self.parse_page(tracking_number, &html)
	}
}

/// Configuration schema for the USPS web provider.
pub struct UspsWebSchema;

impl ConfigSchema for UspsWebSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("base_url", FieldType::String),
				Field::new(
					"timeout_seconds",
					FieldType::Integer {
						min: Some(5),
						max: Some(30),
					},
				),
			],
		);
		schema.validate(config)
	}
}

/// Registry for the USPS web provider.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "usps_web";
	type Factory = TrackingFactory;

	fn factory() -> Self::Factory {
		create_provider
	}
}

impl TrackingProviderRegistry for Registry {}

/// Factory function to create a USPS web provider from configuration.
///
/// Configuration parameters:
/// - `base_url`: Tracking site root (default: "https://tools.usps.com")
/// - `timeout_seconds`: per-request timeout, 5-30 (default: 15)
pub fn create_provider(config: &toml::Value) -> Result<Box<dyn TrackingInterface>, ProviderError> {
	UspsWebSchema
		.validate(config)
		.map_err(|e| ProviderError::Configuration(e.to_string()))?;

	let base_url = config
		.get("base_url")
		.and_then(|v| v.as_str())
		.unwrap_or("https://tools.usps.com")
		.trim_end_matches('/')
		.to_string();
	let timeout_seconds = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.unwrap_or(DEFAULT_TIMEOUT_SECS as i64) as u64;

	let client = reqwest::Client::builder()
		.timeout(Duration::from_secs(timeout_seconds))
		.build()
		.map_err(|e| ProviderError::Configuration(e.to_string()))?;

	Ok(Box::new(UspsWebTracking::new(client, base_url)?))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn provider() -> UspsWebTracking {
		UspsWebTracking::new(reqwest::Client::new(), "https://tools.usps.com".to_string()).unwrap()
	}

	const DELIVERED_PAGE: &str = r#"
		<div class="track-bar-container">
			<strong class="tb-status">Delivered</strong>
			<p class="tb-status-detail">Your item was delivered in or at the mailbox.</p>
		</div>
	"#;

	const AGENT_PAGE: &str = r#"
		<div class="track-bar-container">
			<strong class="tb-status">Delivered to Agent</strong>
			<p class="tb-status-detail">Your item was delivered to an agent.</p>
		</div>
	"#;

	const MISSING_PAGE: &str = r#"
		<div class="error">We could not locate the tracking information for your request.</div>
	"#;

	#[test]
	fn delivered_banner_gets_category() {
		let raw = provider().parse_page("9400X", DELIVERED_PAGE).unwrap();
		assert_eq!(raw.status_category.as_deref(), Some("DELIVERED"));
		assert_eq!(raw.status_summary.as_deref(), Some("Delivered"));
		assert_eq!(raw.events.len(), 1);
	}

	#[test]
	fn agent_banner_stays_category_less() {
		let raw = provider().parse_page("9400X", AGENT_PAGE).unwrap();
		assert_eq!(raw.status_category, None);
		assert_eq!(raw.status_summary.as_deref(), Some("Delivered to Agent"));
	}

	#[test]
	fn missing_number_is_not_found() {
		assert!(matches!(
			provider().parse_page("9400X", MISSING_PAGE),
			Err(ProviderError::NotFound(_))
		));
	}

	#[test]
	fn bannerless_page_is_malformed() {
		assert!(matches!(
			provider().parse_page("9400X", "<html><body>maintenance</body></html>"),
			Err(ProviderError::Malformed(_))
		));
	}

	#[test]
	fn factory_defaults() {
		let config: toml::Value = "".parse().unwrap();
		assert!(create_provider(&config).is_ok());

		let config: toml::Value = "timeout_seconds = 2".parse().unwrap();
		assert!(matches!(
			create_provider(&config),
			Err(ProviderError::Configuration(_))
		));
	}
}
