//! Customer notification module for the WrapCRM tracking system.
//!
//! Mailers implement [`MailerInterface`] and deliver a single message; the
//! [`NotificationGate`] decides whether a message should go out at all. The
//! gate claims an entry in the order's persisted notification log before
//! calling the mailer, so a transition notifies the customer at most once
//! even when sweeps overlap or the process dies mid-send. A duplicate email
//! is treated as worse than a missed one.

use async_trait::async_trait;
use crm_storage::{OrderStore, StorageError};
use crm_types::{
	current_timestamp, truncate_id, ConfigSchema, ImplementationRegistry, NotificationRecord,
	Order, Transition,
};
use std::sync::Arc;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod http;
	pub mod log;
}

/// Errors that can occur during mail delivery.
#[derive(Debug, Error)]
pub enum MailError {
	/// Network communication failure.
	#[error("Network error: {0}")]
	Network(String),
	/// Authentication with the mail service failed.
	#[error("Authentication error: {0}")]
	Auth(String),
	/// The mail service refused the message.
	#[error("Message rejected: {0}")]
	Rejected(String),
	/// Mailer configuration is invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Errors surfaced by the notification gate itself.
///
/// Mail failures are not among them: a failed send is a recorded outcome,
/// not an error the caller must handle.
#[derive(Debug, Error)]
pub enum NotifyError {
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

/// Trait defining the interface for mail delivery implementations.
#[async_trait]
pub trait MailerInterface: Send + Sync {
	/// Returns the configuration schema for this mailer implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Delivers a single message.
	async fn send(
		&self,
		from: &str,
		to: &str,
		subject: &str,
		body: &str,
	) -> Result<(), MailError>;
}

/// Type alias for mailer factory functions.
pub type MailerFactory = fn(&toml::Value) -> Result<Box<dyn MailerInterface>, MailError>;

/// Registry trait for mailer implementations.
pub trait MailerRegistry: ImplementationRegistry<Factory = MailerFactory> {}

/// Get all registered mailer implementations.
pub fn get_all_implementations() -> Vec<(&'static str, MailerFactory)> {
	use implementations::{http, log};

	vec![
		(http::Registry::NAME, http::Registry::factory()),
		(log::Registry::NAME, log::Registry::factory()),
	]
}

/// Why the gate decided not to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
	/// The notification log already holds an entry for this transition.
	AlreadyNotified,
	/// The order has no customer email address.
	NoRecipient,
}

/// Outcome of a notification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
	/// The mailer accepted the message.
	Sent,
	/// Nothing was sent; see the reason.
	Skipped(SkipReason),
	/// The log entry was claimed but the mailer failed. The failure is
	/// recorded on the entry and the transition will not be retried.
	Failed(String),
}

/// Gate that enforces at-most-once customer notification per transition.
pub struct NotificationGate {
	store: Arc<OrderStore>,
	mailer: Box<dyn MailerInterface>,
	from_address: String,
}

impl NotificationGate {
	pub fn new(store: Arc<OrderStore>, mailer: Box<dyn MailerInterface>, from_address: String) -> Self {
		Self {
			store,
			mailer,
			from_address,
		}
	}

	/// Notifies the customer about a transition unless it was already
	/// notified.
	///
	/// The log entry is claimed before the mailer runs. A crash between the
	/// claim and the send loses one email; the alternative ordering could
	/// send the same email twice, which is the outcome this gate exists to
	/// prevent. Mail failures are recorded on the claimed entry and folded
	/// into the returned outcome.
	pub async fn maybe_notify(
		&self,
		order: &Order,
		transition: Transition,
	) -> Result<NotifyOutcome, NotifyError> {
		// Re-read through the store rather than trusting the caller's copy
		if self
			.store
			.get_notification(&order.id, transition)
			.await?
			.is_some()
		{
			return Ok(NotifyOutcome::Skipped(SkipReason::AlreadyNotified));
		}

		let to = order.customer.email.trim();
		if to.is_empty() {
			tracing::warn!(
				order_id = %truncate_id(&order.id),
				order_number = %order.order_number,
				"Order has no customer email, skipping notification"
			);
			return Ok(NotifyOutcome::Skipped(SkipReason::NoRecipient));
		}

		let claimed = self
			.store
			.append_notification_if_absent(
				&order.id,
				NotificationRecord {
					transition,
					email_sent: false,
					timestamp: current_timestamp(),
					error: None,
				},
			)
			.await?;
		if !claimed {
			// A concurrent sweep got here first
			return Ok(NotifyOutcome::Skipped(SkipReason::AlreadyNotified));
		}

		let (subject, body) = build_notice(order, transition);
		match self.mailer.send(&self.from_address, to, &subject, &body).await {
			Ok(()) => {
				self.store
					.update_order_with(&order.id, |o| {
						if let Some(n) =
							o.notifications.iter_mut().find(|n| n.transition == transition)
						{
							n.email_sent = true;
						}
					})
					.await?;
				tracing::info!(
					order_id = %truncate_id(&order.id),
					order_number = %order.order_number,
					transition = %transition,
					"Customer notified"
				);
				Ok(NotifyOutcome::Sent)
			},
			Err(e) => {
				let reason = e.to_string();
				self.store
					.update_order_with(&order.id, |o| {
						if let Some(n) =
							o.notifications.iter_mut().find(|n| n.transition == transition)
						{
							n.error = Some(reason.clone());
						}
					})
					.await?;
				tracing::warn!(
					order_id = %truncate_id(&order.id),
					order_number = %order.order_number,
					transition = %transition,
					error = %reason,
					"Notification send failed"
				);
				Ok(NotifyOutcome::Failed(reason))
			},
		}
	}
}

/// Builds the subject and body for a transition notice.
fn build_notice(order: &Order, transition: Transition) -> (String, String) {
	match transition {
		Transition::Shipped => {
			let subject = format!("Your order {} has shipped", order.order_number);
			let tracking = order.tracking_number.as_deref().unwrap_or("unavailable");
			let body = format!(
				"Hi {},\n\nGood news: your order {} is on its way.\n\
				USPS tracking number: {}\n\nThank you!",
				order.customer.name, order.order_number, tracking
			);
			(subject, body)
		},
		Transition::Delivered => {
			let subject = format!("Your order {} was delivered", order.order_number);
			let when = order
				.date_delivered
				.map(|d| d.format("on %B %-d, %Y").to_string())
				.unwrap_or_else(|| "recently".to_string());
			let body = format!(
				"Hi {},\n\nUSPS reports that your order {} was delivered {}.\n\
				We hope you enjoy it!\n\nThank you!",
				order.customer.name, order.order_number, when
			);
			(subject, body)
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crm_storage::implementations::memory::MemoryStorage;
	use crm_types::{Address, Customer, OrderStatus, ProductType, Schema, ValidationError};
	use std::sync::Mutex;

	struct RecordingMailer {
		sent: Mutex<Vec<(String, String)>>,
		fail: bool,
	}

	impl RecordingMailer {
		fn new(fail: bool) -> Self {
			Self {
				sent: Mutex::new(Vec::new()),
				fail,
			}
		}
	}

	#[async_trait]
	impl MailerInterface for RecordingMailer {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			struct NoConfig;
			impl ConfigSchema for NoConfig {
				fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
					Schema::new(vec![], vec![]).validate(config)
				}
			}
			Box::new(NoConfig)
		}

		async fn send(
			&self,
			_from: &str,
			to: &str,
			subject: &str,
			_body: &str,
		) -> Result<(), MailError> {
			if self.fail {
				return Err(MailError::Network("connection refused".into()));
			}
			self.sent
				.lock()
				.unwrap()
				.push((to.to_string(), subject.to_string()));
			Ok(())
		}
	}

	fn test_order(id: &str, email: &str) -> Order {
		Order {
			id: id.to_string(),
			order_number: format!("WRP-{}", id),
			customer: Customer {
				name: "Pat Doe".into(),
				email: email.into(),
				phone: None,
				address: Address {
					street: "1 Main St".into(),
					city: "Springfield".into(),
					state: "IL".into(),
					zip: "62704".into(),
				},
			},
			product_type: ProductType::TrialKit,
			status: OrderStatus::Shipped,
			tracking_number: Some("9400100000000000000001".into()),
			date_ordered: None,
			date_shipped: None,
			date_delivered: None,
			notifications: Vec::new(),
			created_at: 0,
			updated_at: 0,
		}
	}

	async fn gate_with(
		fail: bool,
		order: Order,
	) -> (NotificationGate, Arc<OrderStore>, String) {
		let store = Arc::new(OrderStore::new(Box::new(MemoryStorage::new())));
		let id = order.id.clone();
		store.insert_order(&order).await.unwrap();
		let gate = NotificationGate::new(
			store.clone(),
			Box::new(RecordingMailer::new(fail)),
			"orders@example.com".into(),
		);
		(gate, store, id)
	}

	#[tokio::test]
	async fn sends_once_then_skips() {
		let order = test_order("n1", "pat@example.com");
		let (gate, store, id) = gate_with(false, order.clone()).await;

		assert_eq!(
			gate.maybe_notify(&order, Transition::Delivered).await.unwrap(),
			NotifyOutcome::Sent
		);
		assert_eq!(
			gate.maybe_notify(&order, Transition::Delivered).await.unwrap(),
			NotifyOutcome::Skipped(SkipReason::AlreadyNotified)
		);

		let record = store
			.get_notification(&id, Transition::Delivered)
			.await
			.unwrap()
			.unwrap();
		assert!(record.email_sent);
		assert!(record.error.is_none());
	}

	#[tokio::test]
	async fn failed_send_is_recorded_and_not_retried() {
		let order = test_order("n2", "pat@example.com");
		let (gate, store, id) = gate_with(true, order.clone()).await;

		match gate.maybe_notify(&order, Transition::Delivered).await.unwrap() {
			NotifyOutcome::Failed(reason) => assert!(reason.contains("connection refused")),
			other => panic!("expected failed outcome, got {:?}", other),
		}

		let record = store
			.get_notification(&id, Transition::Delivered)
			.await
			.unwrap()
			.unwrap();
		assert!(!record.email_sent);
		assert!(record.error.is_some());

		// The claim stands: no second attempt for the same transition
		assert_eq!(
			gate.maybe_notify(&order, Transition::Delivered).await.unwrap(),
			NotifyOutcome::Skipped(SkipReason::AlreadyNotified)
		);
	}

	#[tokio::test]
	async fn missing_recipient_skips_without_claiming() {
		let order = test_order("n3", "  ");
		let (gate, store, id) = gate_with(false, order.clone()).await;

		assert_eq!(
			gate.maybe_notify(&order, Transition::Delivered).await.unwrap(),
			NotifyOutcome::Skipped(SkipReason::NoRecipient)
		);
		assert!(store
			.get_notification(&id, Transition::Delivered)
			.await
			.unwrap()
			.is_none());
	}

	#[tokio::test]
	async fn transitions_are_independent() {
		let order = test_order("n4", "pat@example.com");
		let (gate, _store, _id) = gate_with(false, order.clone()).await;

		assert_eq!(
			gate.maybe_notify(&order, Transition::Shipped).await.unwrap(),
			NotifyOutcome::Sent
		);
		assert_eq!(
			gate.maybe_notify(&order, Transition::Delivered).await.unwrap(),
			NotifyOutcome::Sent
		);
	}

	#[test]
	fn notice_mentions_order_and_tracking() {
		let order = test_order("n5", "pat@example.com");

		let (subject, body) = build_notice(&order, Transition::Shipped);
		assert!(subject.contains("WRP-n5"));
		assert!(body.contains("9400100000000000000001"));

		let (subject, _) = build_notice(&order, Transition::Delivered);
		assert!(subject.contains("delivered"));
	}
}
