//! Mailer that writes messages to the log instead of sending them.
//!
//! Used in development and tests so the notification pipeline can be
//! exercised end to end without a mail provider.

use crate::{MailError, MailerFactory, MailerInterface, MailerRegistry};
use async_trait::async_trait;
use crm_types::{ConfigSchema, ImplementationRegistry, Schema, ValidationError};

/// Log-only mailer implementation.
pub struct LogMailer;

#[async_trait]
impl MailerInterface for LogMailer {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LogMailerSchema)
	}

	async fn send(
		&self,
		from: &str,
		to: &str,
		subject: &str,
		body: &str,
	) -> Result<(), MailError> {
		tracing::info!(
			from = %from,
			to = %to,
			subject = %subject,
			body_len = body.len(),
			"Mail (log only, not sent)"
		);
		Ok(())
	}
}

/// Configuration schema for the log mailer.
pub struct LogMailerSchema;

impl ConfigSchema for LogMailerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		// No configuration required
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Registry for the log mailer implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "log";
	type Factory = MailerFactory;

	fn factory() -> Self::Factory {
		create_mailer
	}
}

impl MailerRegistry for Registry {}

/// Factory function to create a log mailer from configuration.
pub fn create_mailer(_config: &toml::Value) -> Result<Box<dyn MailerInterface>, MailError> {
	Ok(Box::new(LogMailer))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn always_accepts() {
		let mailer = LogMailer;
		mailer
			.send("orders@example.com", "pat@example.com", "subject", "body")
			.await
			.unwrap();
	}
}
