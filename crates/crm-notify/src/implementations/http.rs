//! Mailer backed by a transactional-mail HTTP API.
//!
//! Posts a JSON message to the configured endpoint with a bearer API key.
//! The payload shape (from/to/subject/text) matches the common denominator
//! of transactional providers.

use crate::{MailError, MailerFactory, MailerInterface, MailerRegistry};
use async_trait::async_trait;
use crm_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, SecretString, ValidationError,
};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// HTTP API mailer implementation.
pub struct HttpMailer {
	client: reqwest::Client,
	endpoint: String,
	api_key: SecretString,
}

impl HttpMailer {
	pub fn new(client: reqwest::Client, endpoint: String, api_key: SecretString) -> Self {
		Self {
			client,
			endpoint,
			api_key,
		}
	}
}

#[async_trait]
impl MailerInterface for HttpMailer {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpMailerSchema)
	}

	async fn send(
		&self,
		from: &str,
		to: &str,
		subject: &str,
		body: &str,
	) -> Result<(), MailError> {
		let response = self
			.client
			.post(&self.endpoint)
			.bearer_auth(self.api_key.expose_secret())
			.json(&serde_json::json!({
				"from": from,
				"to": to,
				"subject": subject,
				"text": body,
			}))
			.send()
			.await
			.map_err(|e| MailError::Network(e.to_string()))?;

		let status = response.status();
		if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
		{
			return Err(MailError::Auth(format!(
				"mail API rejected credentials with {}",
				status
			)));
		}
		if !status.is_success() {
			let detail = response.text().await.unwrap_or_default();
			return Err(MailError::Rejected(format!("{}: {}", status, detail)));
		}

		Ok(())
	}
}

/// Configuration schema for the HTTP mailer.
pub struct HttpMailerSchema;

impl ConfigSchema for HttpMailerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("endpoint", FieldType::String),
				Field::new("api_key", FieldType::String),
			],
			vec![Field::new(
				"timeout_seconds",
				FieldType::Integer {
					min: Some(1),
					max: Some(60),
				},
			)],
		);
		schema.validate(config)
	}
}

/// Registry for the HTTP mailer implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "http";
	type Factory = MailerFactory;

	fn factory() -> Self::Factory {
		create_mailer
	}
}

impl MailerRegistry for Registry {}

/// Factory function to create an HTTP mailer from configuration.
///
/// Configuration parameters:
/// - `endpoint`: Mail API URL to POST messages to (required)
/// - `api_key`: Bearer token for the mail API (required)
/// - `timeout_seconds`: per-request timeout, 1-60 (default: 10)
pub fn create_mailer(config: &toml::Value) -> Result<Box<dyn MailerInterface>, MailError> {
	HttpMailerSchema
		.validate(config)
		.map_err(|e| MailError::Configuration(e.to_string()))?;

	let endpoint = config
		.get("endpoint")
		.and_then(|v| v.as_str())
		.map(String::from)
		.ok_or_else(|| MailError::Configuration("endpoint is required".into()))?;
	let api_key = config
		.get("api_key")
		.and_then(|v| v.as_str())
		.map(SecretString::from)
		.ok_or_else(|| MailError::Configuration("api_key is required".into()))?;
	let timeout_seconds = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.unwrap_or(DEFAULT_TIMEOUT_SECS as i64) as u64;

	let client = reqwest::Client::builder()
		.timeout(Duration::from_secs(timeout_seconds))
		.build()
		.map_err(|e| MailError::Configuration(e.to_string()))?;

	Ok(Box::new(HttpMailer::new(client, endpoint, api_key)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn factory_requires_endpoint_and_key() {
		let config: toml::Value = "endpoint = \"https://api.mailer.example/v1/send\""
			.parse()
			.unwrap();
		assert!(matches!(
			create_mailer(&config),
			Err(MailError::Configuration(_))
		));

		let config: toml::Value =
			"endpoint = \"https://api.mailer.example/v1/send\"\napi_key = \"k\""
				.parse()
				.unwrap();
		assert!(create_mailer(&config).is_ok());
	}

	#[test]
	fn timeout_bounds_validated() {
		let config: toml::Value =
			"endpoint = \"https://api.mailer.example/v1/send\"\napi_key = \"k\"\ntimeout_seconds = 0"
				.parse()
				.unwrap();
		assert!(matches!(
			create_mailer(&config),
			Err(MailError::Configuration(_))
		));
	}
}
