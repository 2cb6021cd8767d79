//! Sweep report types.
//!
//! Every trigger surface (HTTP JSON, diagnostic page, scheduler) receives
//! the same [`SweepReport`]; they differ only in presentation.

use serde::{Deserialize, Serialize};

/// Aggregate result of one delivery sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
	/// Number of shipped orders examined.
	pub checked: usize,
	/// Number of orders transitioned to delivered.
	pub updated: usize,
	/// Per-order failures. A non-empty list does not mean the sweep
	/// failed; failed orders are retried on the next sweep.
	pub errors: Vec<OrderError>,
	/// When the sweep started (Unix seconds).
	pub started_at: u64,
	/// Wall-clock duration of the sweep.
	pub elapsed_ms: u64,
	/// True if the sweep stopped early because its soft time budget ran
	/// out. Unprocessed orders are picked up by the next sweep.
	pub budget_exhausted: bool,
}

impl SweepReport {
	pub fn is_clean(&self) -> bool {
		self.errors.is_empty() && !self.budget_exhausted
	}
}

/// A single order's failure during a sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderError {
	pub order_id: String,
	pub order_number: String,
	pub message: String,
}
