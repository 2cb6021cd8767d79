//! Tracking provider backed by the official USPS Tracking API.
//!
//! Authenticates with client-credentials OAuth, caches the bearer token
//! until shortly before expiry, and maps the carrier's JSON into the
//! provider-neutral [`RawTrackingResult`] envelope. All knowledge of the
//! USPS request/response shape stays inside this module.

use crate::{ProviderError, TrackingFactory, TrackingInterface, TrackingProviderRegistry};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use crm_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, RawTrackingResult, Schema,
	SecretString, TrackingEvent, ValidationError,
};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Default request timeout; clamped to 5-30s by the config schema.
const DEFAULT_TIMEOUT_SECS: u64 = 15;
/// Refresh the OAuth token this long before the carrier says it expires.
const TOKEN_EXPIRY_MARGIN_SECS: u64 = 60;

/// USPS API tracking provider.
pub struct UspsApiTracking {
	client: reqwest::Client,
	base_url: String,
	client_id: SecretString,
	client_secret: SecretString,
	token: Mutex<Option<CachedToken>>,
}

struct CachedToken {
	access_token: String,
	expires_at: Instant,
}

/// OAuth token response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
	access_token: String,
	expires_in: u64,
}

/// Tracking lookup response, USPS Tracking v3 shape.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackingResponse {
	#[serde(default)]
	tracking_number: Option<String>,
	#[serde(default)]
	status_category: Option<String>,
	#[serde(default)]
	status_summary: Option<String>,
	#[serde(default)]
	expected_delivery_time_stamp: Option<String>,
	#[serde(default)]
	tracking_events: Vec<ApiTrackingEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiTrackingEvent {
	#[serde(default)]
	event_type: Option<String>,
	#[serde(default)]
	event_timestamp: Option<String>,
	#[serde(default)]
	event_city: Option<String>,
	#[serde(default)]
	event_state: Option<String>,
	// USPS spells this one all-caps, outside the camelCase convention
	#[serde(default, rename = "eventZIP")]
	event_zip: Option<String>,
}

impl UspsApiTracking {
	pub fn new(
		client: reqwest::Client,
		base_url: String,
		client_id: SecretString,
		client_secret: SecretString,
	) -> Self {
		Self {
			client,
			base_url,
			client_id,
			client_secret,
			token: Mutex::new(None),
		}
	}

	/// Returns a valid bearer token, fetching a fresh one when the cached
	/// token is missing or about to expire.
	async fn bearer_token(&self) -> Result<String, ProviderError> {
		let mut cached = self.token.lock().await;
		if let Some(token) = cached.as_ref() {
			if token.expires_at > Instant::now() {
				return Ok(token.access_token.clone());
			}
		}

		let response = self
			.client
			.post(format!("{}/oauth2/v3/token", self.base_url))
			.json(&serde_json::json!({
				"grant_type": "client_credentials",
				"client_id": self.client_id.expose_secret(),
				"client_secret": self.client_secret.expose_secret(),
			}))
			.send()
			.await
			.map_err(map_transport_error)?;

		let status = response.status();
		if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
		{
			return Err(ProviderError::Auth(format!(
				"token request rejected with {}",
				status
			)));
		}
		if !status.is_success() {
			return Err(ProviderError::Network(format!(
				"token request failed with {}",
				status
			)));
		}

		let token: TokenResponse = response
			.json()
			.await
			.map_err(|e| ProviderError::Malformed(format!("token response: {}", e)))?;

		let lifetime = token
			.expires_in
			.saturating_sub(TOKEN_EXPIRY_MARGIN_SECS)
			.max(1);
		let access_token = token.access_token.clone();
		*cached = Some(CachedToken {
			access_token: token.access_token,
			expires_at: Instant::now() + Duration::from_secs(lifetime),
		});

		Ok(access_token)
	}
}

#[async_trait]
impl TrackingInterface for UspsApiTracking {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(UspsApiSchema)
	}

	async fn resolve(&self, tracking_number: &str) -> Result<RawTrackingResult, ProviderError> {
		let token = self.bearer_token().await?;

		let response = self
			.client
			.get(format!(
				"{}/tracking/v3/tracking/{}",
				self.base_url, tracking_number
			))
			.query(&[("expand", "DETAIL")])
			.bearer_auth(token)
			.send()
			.await
			.map_err(map_transport_error)?;

		let status = response.status();
		if status == reqwest::StatusCode::NOT_FOUND {
			return Err(ProviderError::NotFound(tracking_number.to_string()));
		}
		if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
		{
			return Err(ProviderError::Auth(format!(
				"tracking request rejected with {}",
				status
			)));
		}
		if !status.is_success() {
			return Err(ProviderError::Network(format!(
				"tracking request failed with {}",
				status
			)));
		}

		let body: TrackingResponse = response
			.json()
			.await
			.map_err(|e| ProviderError::Malformed(format!("tracking response: {}", e)))?;

		Ok(into_raw_result(tracking_number, body))
	}
}

/// Maps reqwest transport failures to provider errors.
fn map_transport_error(err: reqwest::Error) -> ProviderError {
	if err.is_timeout() {
		ProviderError::Timeout(err.to_string())
	} else {
		ProviderError::Network(err.to_string())
	}
}

/// Converts the USPS response into the provider-neutral envelope.
fn into_raw_result(tracking_number: &str, body: TrackingResponse) -> RawTrackingResult {
	let events = body
		.tracking_events
		.into_iter()
		.filter_map(|e| {
			let description = e.event_type?;
			let location = match (e.event_city, e.event_state, e.event_zip) {
				(Some(city), Some(state), zip) => Some(match zip {
					Some(zip) => format!("{}, {} {}", city, state, zip),
					None => format!("{}, {}", city, state),
				}),
				_ => None,
			};
			Some(TrackingEvent {
				description,
				location,
				timestamp: e.event_timestamp.as_deref().and_then(parse_timestamp),
			})
		})
		.collect();

	RawTrackingResult {
		tracking_number: body
			.tracking_number
			.unwrap_or_else(|| tracking_number.to_string()),
		status_summary: body.status_summary,
		status_category: body.status_category,
		events,
		expected_delivery: body
			.expected_delivery_time_stamp
			.as_deref()
			.and_then(parse_timestamp),
	}
}

/// Parses USPS timestamps, which come as RFC 3339 or as a bare local
/// datetime without an offset.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
	if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
		return Some(dt.with_timezone(&Utc));
	}
	NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
		.ok()
		.map(|naive| naive.and_utc())
}

/// Configuration schema for the USPS API provider.
pub struct UspsApiSchema;

impl ConfigSchema for UspsApiSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("client_id", FieldType::String),
				Field::new("client_secret", FieldType::String),
			],
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

/// Registry for the USPS API provider.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "usps_api";
	type Factory = TrackingFactory;

	fn factory() -> Self::Factory {
		create_provider
	}
}

impl TrackingProviderRegistry for Registry {}

/// Factory function to create a USPS API provider from configuration.
///
/// Configuration parameters:
/// - `client_id` / `client_secret`: OAuth client credentials (required)
/// - `base_url`: API root (default: "https://apis.usps.com")
/// - `timeout_seconds`: per-request timeout, 5-30 (default: 15)
pub fn create_provider(config: &toml::Value) -> Result<Box<dyn TrackingInterface>, ProviderError> {
	UspsApiSchema
		.validate(config)
		.map_err(|e| ProviderError::Configuration(e.to_string()))?;

	let base_url = config
		.get("base_url")
		.and_then(|v| v.as_str())
		.unwrap_or("https://apis.usps.com")
		.trim_end_matches('/')
		.to_string();
	let client_id = config
		.get("client_id")
		.and_then(|v| v.as_str())
		.map(SecretString::from)
		.ok_or_else(|| ProviderError::Configuration("client_id is required".into()))?;
	let client_secret = config
		.get("client_secret")
		.and_then(|v| v.as_str())
		.map(SecretString::from)
		.ok_or_else(|| ProviderError::Configuration("client_secret is required".into()))?;
	let timeout_seconds = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.unwrap_or(DEFAULT_TIMEOUT_SECS as i64) as u64;

	let client = reqwest::Client::builder()
		.timeout(Duration::from_secs(timeout_seconds))
		.build()
		.map_err(|e| ProviderError::Configuration(e.to_string()))?;

	Ok(Box::new(UspsApiTracking::new(
		client,
		base_url,
		client_id,
		client_secret,
	)))
}
