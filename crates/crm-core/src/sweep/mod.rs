//! Delivery sweep implementation.
//!
//! A sweep walks every shipped order with a tracking number, asks the
//! tracking service where the package is, and transitions the ones the
//! carrier reports delivered. One bad order never stops the batch: the
//! failure is recorded in the report and the next order is processed.
//! Only the initial store query is fatal, because without the candidate
//! list there is no batch to run.

use crate::state::{DeliveredOutcome, OrderStateMachine};
use crm_notify::NotificationGate;
use crm_storage::{OrderStore, StorageError};
use crm_tracking::TrackingService;
use crm_types::{
	current_timestamp, truncate_id, NormalizedStatus, Order, OrderError, SweepReport, Transition,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that abort an entire sweep.
#[derive(Debug, Error)]
pub enum SweepError {
	/// The candidate query failed; no orders were processed.
	#[error("Store error: {0}")]
	Store(#[from] StorageError),
}

/// Walks shipped orders and settles their delivery status.
pub struct DeliverySweeper {
	store: Arc<OrderStore>,
	tracking: Arc<TrackingService>,
	state: OrderStateMachine,
	gate: NotificationGate,
	/// Pause between carrier calls, politeness toward the carrier.
	pause: Duration,
	/// Soft wall-clock budget for one sweep.
	budget: Duration,
}

impl DeliverySweeper {
	pub fn new(
		store: Arc<OrderStore>,
		tracking: Arc<TrackingService>,
		state: OrderStateMachine,
		gate: NotificationGate,
		pause: Duration,
		budget: Duration,
	) -> Self {
		Self {
			store,
			tracking,
			state,
			gate,
			pause,
			budget,
		}
	}

	/// Runs one delivery sweep and returns its report.
	///
	/// Safe to run concurrently with itself: the idempotent delivery
	/// transition and the notification gate's log claim make a double-run
	/// change nothing the second time.
	pub async fn run_sweep(&self) -> Result<SweepReport, SweepError> {
		let clock = Instant::now();
		let mut report = SweepReport {
			checked: 0,
			updated: 0,
			errors: Vec::new(),
			started_at: current_timestamp(),
			elapsed_ms: 0,
			budget_exhausted: false,
		};

		let candidates = self.store.find_shipped_with_tracking().await?;
		tracing::info!(candidates = candidates.len(), "Starting delivery sweep");

		for (i, order) in candidates.iter().enumerate() {
			if clock.elapsed() >= self.budget {
				report.budget_exhausted = true;
				tracing::warn!(
					checked = report.checked,
					remaining = candidates.len() - i,
					"Sweep budget exhausted, stopping early"
				);
				break;
			}
			if i > 0 && !self.pause.is_zero() {
				tokio::time::sleep(self.pause).await;
			}

			report.checked += 1;
			self.process_order(order, &mut report).await;
		}

		report.elapsed_ms = clock.elapsed().as_millis() as u64;
		tracing::info!(
			checked = report.checked,
			updated = report.updated,
			errors = report.errors.len(),
			elapsed_ms = report.elapsed_ms,
			budget_exhausted = report.budget_exhausted,
			"Delivery sweep finished"
		);
		Ok(report)
	}

	async fn process_order(&self, order: &Order, report: &mut SweepReport) {
		// Candidates always carry a tracking number; a race that removed
		// it just means the order is no longer ours to sweep
		let Some(tracking_number) = order.tracking_number.as_deref() else {
			return;
		};

		match self.tracking.get_status(tracking_number).await {
			NormalizedStatus::Delivered { date } => {
				match self.state.mark_delivered(&order.id, date).await {
					Ok(DeliveredOutcome::Transitioned { order: updated }) => {
						report.updated += 1;
						self.notify_delivered(&updated).await;
					},
					Ok(DeliveredOutcome::AlreadyDelivered) => {
						// Another sweep won the race; nothing to do
					},
					Err(e) => {
						tracing::warn!(
							order_id = %truncate_id(&order.id),
							error = %e,
							"Failed to transition delivered order"
						);
						report.errors.push(OrderError {
							order_id: order.id.clone(),
							order_number: order.order_number.clone(),
							message: e.to_string(),
						});
					},
				}
			},
			NormalizedStatus::InTransit => {
				tracing::debug!(
					order_id = %truncate_id(&order.id),
					tracking_number = %tracking_number,
					"Order still in transit"
				);
			},
			NormalizedStatus::NotFound => {
				// The carrier does not know the number. Worth an operator's
				// attention but not a state change: labels often scan in late
				tracing::warn!(
					order_id = %truncate_id(&order.id),
					order_number = %order.order_number,
					tracking_number = %tracking_number,
					"Carrier does not recognize tracking number"
				);
			},
			NormalizedStatus::Error { reason } => {
				report.errors.push(OrderError {
					order_id: order.id.clone(),
					order_number: order.order_number.clone(),
					message: reason,
				});
			},
		}
	}

	/// Notifies the customer after a delivery transition. Never fatal: the
	/// order is already delivered and a failed email must not undo that.
	async fn notify_delivered(&self, order: &Order) {
		match self.gate.maybe_notify(order, Transition::Delivered).await {
			Ok(outcome) => {
				tracing::debug!(
					order_id = %truncate_id(&order.id),
					outcome = ?outcome,
					"Delivery notification outcome"
				);
			},
			Err(e) => {
				tracing::warn!(
					order_id = %truncate_id(&order.id),
					error = %e,
					"Could not record delivery notification"
				);
			},
		}
	}
}
