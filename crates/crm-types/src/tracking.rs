//! Carrier tracking types.
//!
//! The raw envelope returned by a tracking provider is deliberately loose:
//! free-form status text, an event history, and whatever machine-readable
//! category the carrier exposes. The resolver narrows it into the closed
//! [`NormalizedStatus`] variant at a single translation point, so carrier
//! ambiguity never leaks further into the system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider-specific tracking result, unnormalized.
///
/// Providers fill in as much as their backend exposes. The official API
/// populates `status_category`; the web fallback usually only has
/// narrative text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTrackingResult {
	/// The tracking number this result describes.
	pub tracking_number: String,
	/// Free-form current status line, e.g. "Your item was delivered".
	#[serde(skip_serializing_if = "Option::is_none")]
	pub status_summary: Option<String>,
	/// Carrier's machine-readable status code when available,
	/// e.g. "DELIVERED" or "IN_TRANSIT". This is the field the strict
	/// delivered-policy trusts.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub status_category: Option<String>,
	/// Scan event history, most providers return newest first but the
	/// resolver does not rely on ordering.
	#[serde(default)]
	pub events: Vec<TrackingEvent>,
	/// Carrier's expected delivery date, if published.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub expected_delivery: Option<DateTime<Utc>>,
}

/// One scan event in a package's tracking history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingEvent {
	/// Narrative description, e.g. "Delivered, In/At Mailbox".
	pub description: String,
	/// City/state/zip string when the carrier includes one.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub location: Option<String>,
	/// Event timestamp. Scraped results may lack this.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub timestamp: Option<DateTime<Utc>>,
}

/// Normalized delivery status produced by the resolver.
///
/// Callers must treat `Error` as "retry on a later sweep, change nothing"
/// and `NotFound`/`InTransit` as "no change now". Only `Delivered` drives
/// a state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedStatus {
	/// Carrier confirmed delivery. Carries the carrier-reported delivery
	/// time when the event history includes one.
	Delivered { date: Option<DateTime<Utc>> },
	/// Tracking number is valid but the package is still moving.
	InTransit,
	/// Carrier definitively does not know this tracking number.
	NotFound,
	/// Provider failure (network, auth, malformed response). Distinct from
	/// NotFound: nothing can be concluded about the package.
	Error { reason: String },
}

impl fmt::Display for NormalizedStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			NormalizedStatus::Delivered { date: Some(d) } => write!(f, "delivered at {}", d),
			NormalizedStatus::Delivered { date: None } => write!(f, "delivered"),
			NormalizedStatus::InTransit => write!(f, "in transit"),
			NormalizedStatus::NotFound => write!(f, "not found"),
			NormalizedStatus::Error { reason } => write!(f, "error: {}", reason),
		}
	}
}

/// Policy for interpreting ambiguous "delivered to agent/neighbor"
/// narration.
///
/// Strict requires the carrier's own status field to assert completion
/// before an order is marked delivered; lenient accepts a substring match
/// in narrative event text. Strict is the default because a false
/// "delivered" email is judged worse than a late one.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveredPolicy {
	#[default]
	Strict,
	Lenient,
}
