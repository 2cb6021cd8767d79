//! Shipment order types for the CRM tracking system.
//!
//! This module defines the order record that flows through the delivery
//! pipeline, its status lifecycle, and the append-only notification log
//! that guards against duplicate customer emails.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A sample-booklet shipment order.
///
/// Orders are created by the intake surface in `Pending`, move to `Shipped`
/// when a tracking number is assigned, and are moved to `Delivered`
/// exclusively by the delivery sweeper once the carrier confirms delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
	/// Opaque unique identifier, assigned at creation, immutable.
	pub id: String,
	/// Human-facing unique business key (e.g. "WRP-10042"), immutable.
	pub order_number: String,
	/// Customer contact and shipping details. Mutable only through the
	/// explicit edit surface, never by the tracking core.
	pub customer: Customer,
	/// Which sample product this order ships.
	pub product_type: ProductType,
	/// Current lifecycle status. Forward-only: no automated transition
	/// ever moves an order backward.
	pub status: OrderStatus,
	/// Carrier tracking number, set once at ship time.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tracking_number: Option<String>,
	/// When the customer placed the order.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub date_ordered: Option<DateTime<Utc>>,
	/// When the order entered `Shipped`. Set exactly once.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub date_shipped: Option<DateTime<Utc>>,
	/// When the carrier reported delivery (or when the sweep observed it).
	#[serde(skip_serializing_if = "Option::is_none")]
	pub date_delivered: Option<DateTime<Utc>>,
	/// Append-only log of notification attempts, at most one entry per
	/// transition. The notification gate is the only writer.
	#[serde(default)]
	pub notifications: Vec<NotificationRecord>,
	/// Timestamp when this order was created (Unix seconds).
	pub created_at: u64,
	/// Timestamp when this order was last updated (Unix seconds).
	pub updated_at: u64,
}

impl Order {
	/// Returns true if the sweeper may consider this order: it is in
	/// `Shipped` and carries a non-empty tracking number.
	pub fn is_sweep_candidate(&self) -> bool {
		self.status == OrderStatus::Shipped
			&& self
				.tracking_number
				.as_deref()
				.is_some_and(|t| !t.is_empty())
	}

	/// Returns true if a notification has already been attempted for the
	/// given transition, whether or not the send succeeded.
	pub fn has_notification(&self, transition: Transition) -> bool {
		self.notifications.iter().any(|n| n.transition == transition)
	}
}

/// Customer contact and shipping details attached to an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
	pub name: String,
	pub email: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub phone: Option<String>,
	pub address: Address,
}

/// Shipping address value object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
	pub street: String,
	pub city: String,
	pub state: String,
	pub zip: String,
}

/// Product catalog for sample-booklet mail orders.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProductType {
	#[serde(rename = "Demo Kit & Sample Booklet")]
	DemoKitAndSampleBooklet,
	#[serde(rename = "Sample Booklet Only")]
	SampleBookletOnly,
	#[serde(rename = "Trial Kit")]
	TrialKit,
	#[serde(rename = "Demo Kit Only")]
	DemoKitOnly,
}

/// Status of a shipment order.
///
/// `Delivered` is terminal for the automated flow; only administrative
/// action (out of scope here) ever moves an order after that.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
	Pending,
	Shipped,
	Delivered,
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OrderStatus::Pending => write!(f, "pending"),
			OrderStatus::Shipped => write!(f, "shipped"),
			OrderStatus::Delivered => write!(f, "delivered"),
		}
	}
}

/// A status transition that may warrant a customer notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
	/// Order was shipped and assigned a tracking number.
	Shipped,
	/// Carrier confirmed delivery.
	Delivered,
}

impl fmt::Display for Transition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Transition::Shipped => write!(f, "shipped"),
			Transition::Delivered => write!(f, "delivered"),
		}
	}
}

/// One entry in an order's append-only notification log.
///
/// An entry is written for every notification *attempt*, successful or not,
/// so a flaky mail provider cannot cause repeat sends on later sweeps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
	/// Which transition triggered the notification.
	pub transition: Transition,
	/// Whether the mail collaborator reported success.
	pub email_sent: bool,
	/// When the attempt was made (Unix seconds).
	pub timestamp: u64,
	/// Mailer error message for failed attempts.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_order(status: OrderStatus, tracking: Option<&str>) -> Order {
		Order {
			id: "ord-1".into(),
			order_number: "WRP-10001".into(),
			customer: Customer {
				name: "Pat Doe".into(),
				email: "pat@example.com".into(),
				phone: None,
				address: Address {
					street: "1 Main St".into(),
					city: "Springfield".into(),
					state: "IL".into(),
					zip: "62704".into(),
				},
			},
			product_type: ProductType::SampleBookletOnly,
			status,
			tracking_number: tracking.map(String::from),
			date_ordered: None,
			date_shipped: None,
			date_delivered: None,
			notifications: Vec::new(),
			created_at: 0,
			updated_at: 0,
		}
	}

	#[test]
	fn sweep_candidate_requires_shipped_and_tracking() {
		assert!(sample_order(OrderStatus::Shipped, Some("9400100000000000000001")).is_sweep_candidate());
		assert!(!sample_order(OrderStatus::Shipped, None).is_sweep_candidate());
		assert!(!sample_order(OrderStatus::Shipped, Some("")).is_sweep_candidate());
		assert!(!sample_order(OrderStatus::Pending, Some("9400")).is_sweep_candidate());
		assert!(!sample_order(OrderStatus::Delivered, Some("9400")).is_sweep_candidate());
	}

	#[test]
	fn has_notification_matches_transition() {
		let mut order = sample_order(OrderStatus::Shipped, Some("9400"));
		order.notifications.push(NotificationRecord {
			transition: Transition::Delivered,
			email_sent: false,
			timestamp: 100,
			error: Some("smtp timeout".into()),
		});

		assert!(order.has_notification(Transition::Delivered));
		assert!(!order.has_notification(Transition::Shipped));
	}

	#[test]
	fn product_type_uses_catalog_names() {
		let json = serde_json::to_string(&ProductType::DemoKitAndSampleBooklet).unwrap();
		assert_eq!(json, "\"Demo Kit & Sample Booklet\"");

		let parsed: ProductType = serde_json::from_str("\"Trial Kit\"").unwrap();
		assert_eq!(parsed, ProductType::TrialKit);
	}
}
