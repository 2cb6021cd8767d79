//! Interval scheduler for automatic delivery sweeps.
//!
//! Owns the `last_sweep` timestamp explicitly instead of deriving it from
//! ambient state, so "when did we last check" is always answerable from the
//! logs. A failed sweep does not stop the scheduler; the next tick tries
//! again.

use crm_core::DeliverySweeper;
use crm_types::current_timestamp;
use std::sync::Arc;
use std::time::Duration;

/// Runs delivery sweeps on a fixed interval.
pub struct SweepScheduler {
	sweeper: Arc<DeliverySweeper>,
	interval: Duration,
	last_sweep: Option<u64>,
}

impl SweepScheduler {
	pub fn new(sweeper: Arc<DeliverySweeper>, interval: Duration) -> Self {
		Self {
			sweeper,
			interval,
			last_sweep: None,
		}
	}

	/// When the last sweep started (Unix seconds), if one has run.
	pub fn last_sweep(&self) -> Option<u64> {
		self.last_sweep
	}

	/// Runs sweeps forever: one immediately, then one per interval.
	pub async fn run(mut self) {
		let mut ticker = tokio::time::interval(self.interval);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

		loop {
			ticker.tick().await;
			self.sweep_once().await;
		}
	}

	async fn sweep_once(&mut self) {
		tracing::info!(
			last_sweep = ?self.last_sweep,
			"Scheduled delivery sweep starting"
		);
		let started_at = current_timestamp();

		match self.sweeper.run_sweep().await {
			Ok(report) => {
				self.last_sweep = Some(started_at);
				tracing::info!(
					checked = report.checked,
					updated = report.updated,
					errors = report.errors.len(),
					budget_exhausted = report.budget_exhausted,
					"Scheduled delivery sweep finished"
				);
			},
			Err(e) => {
				// Keep last_sweep pointing at the last successful run
				tracing::error!(error = %e, "Scheduled delivery sweep failed");
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crm_core::OrderStateMachine;
	use crm_notify::implementations::log::LogMailer;
	use crm_notify::NotificationGate;
	use crm_storage::implementations::memory::MemoryStorage;
	use crm_storage::OrderStore;
	use crm_tracking::implementations::fixture::FixtureTracking;
	use crm_tracking::{TrackingInterface, TrackingService};
	use crm_types::DeliveredPolicy;

	fn test_sweeper() -> Arc<DeliverySweeper> {
		let store = Arc::new(OrderStore::new(Box::new(MemoryStorage::new())));
		let tracking = Arc::new(TrackingService::new(
			vec![(
				"fixture".to_string(),
				Box::new(FixtureTracking::new()) as Box<dyn TrackingInterface>,
			)],
			DeliveredPolicy::Strict,
		));
		Arc::new(DeliverySweeper::new(
			store.clone(),
			tracking,
			OrderStateMachine::new(store.clone()),
			NotificationGate::new(store, Box::new(LogMailer), "orders@example.com".into()),
			Duration::ZERO,
			Duration::from_secs(60),
		))
	}

	#[tokio::test]
	async fn sweep_once_records_last_sweep() {
		let mut scheduler = SweepScheduler::new(test_sweeper(), Duration::from_secs(3600));
		assert!(scheduler.last_sweep().is_none());

		scheduler.sweep_once().await;
		assert!(scheduler.last_sweep().is_some());
	}
}
