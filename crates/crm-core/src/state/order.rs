//! Order state machine implementation.
//!
//! Manages order state transitions with validation, ensuring orders move
//! through the lifecycle Pending -> Shipped -> Delivered. Delivered is
//! terminal: the sweeper never moves an order backwards, so a carrier
//! hiccup can only delay a delivery, never undo one.

use chrono::{DateTime, Utc};
use crm_storage::{OrderStore, StorageError};
use crm_types::{current_timestamp, truncate_id, Order, OrderStatus};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during order state management.
#[derive(Debug, Error)]
pub enum OrderStateError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Invalid state transition from {from:?} to {to:?}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	#[error("Order not found: {0}")]
	OrderNotFound(String),
	#[error("Order {0} has no tracking number")]
	MissingTrackingNumber(String),
}

impl OrderStateError {
	fn from_storage(order_id: &str, e: StorageError) -> Self {
		match e {
			StorageError::NotFound => OrderStateError::OrderNotFound(order_id.to_string()),
			other => OrderStateError::Storage(other.to_string()),
		}
	}
}

/// Result of a delivery transition attempt.
#[derive(Debug)]
pub enum DeliveredOutcome {
	/// The order moved to `Delivered`; holds the persisted order.
	Transitioned { order: Order },
	/// The order was already delivered. Nothing was written.
	AlreadyDelivered,
}

/// Manages order state transitions and persistence.
pub struct OrderStateMachine {
	store: Arc<OrderStore>,
}

impl OrderStateMachine {
	pub fn new(store: Arc<OrderStore>) -> Self {
		Self { store }
	}

	/// Updates an order with a closure and persists it.
	pub async fn update_order_with<F>(
		&self,
		order_id: &str,
		updater: F,
	) -> Result<Order, OrderStateError>
	where
		F: FnOnce(&mut Order),
	{
		self.store
			.update_order_with(order_id, |order| {
				updater(order);
				order.updated_at = current_timestamp();
			})
			.await
			.map_err(|e| OrderStateError::from_storage(order_id, e))
	}

	/// Marks an order as shipped with its carrier tracking number.
	///
	/// Sets `date_shipped` on the first call only; re-shipping an order is
	/// not a thing this system models.
	pub async fn mark_shipped(
		&self,
		order_id: &str,
		tracking_number: &str,
	) -> Result<Order, OrderStateError> {
		let tracking_number = tracking_number.trim();
		if tracking_number.is_empty() {
			return Err(OrderStateError::MissingTrackingNumber(order_id.to_string()));
		}

		let order = self.get_order(order_id).await?;
		if !Self::is_valid_transition(&order.status, &OrderStatus::Shipped) {
			return Err(OrderStateError::InvalidTransition {
				from: order.status,
				to: OrderStatus::Shipped,
			});
		}

		self.update_order_with(order_id, |o| {
			o.status = OrderStatus::Shipped;
			o.tracking_number = Some(tracking_number.to_string());
			if o.date_shipped.is_none() {
				o.date_shipped = Some(Utc::now());
			}
		})
		.await
	}

	/// Marks an order as delivered, idempotently.
	///
	/// An already-delivered order returns `AlreadyDelivered` without a
	/// write, which is what makes overlapping sweeps safe. Any other
	/// non-`Shipped` status is an invalid transition.
	pub async fn mark_delivered(
		&self,
		order_id: &str,
		date: Option<DateTime<Utc>>,
	) -> Result<DeliveredOutcome, OrderStateError> {
		let order = self.get_order(order_id).await?;

		if order.status == OrderStatus::Delivered {
			tracing::debug!(
				order_id = %truncate_id(order_id),
				"Order already delivered, skipping"
			);
			return Ok(DeliveredOutcome::AlreadyDelivered);
		}
		if !Self::is_valid_transition(&order.status, &OrderStatus::Delivered) {
			return Err(OrderStateError::InvalidTransition {
				from: order.status,
				to: OrderStatus::Delivered,
			});
		}
		if order
			.tracking_number
			.as_deref()
			.map(str::trim)
			.unwrap_or_default()
			.is_empty()
		{
			return Err(OrderStateError::MissingTrackingNumber(order_id.to_string()));
		}

		let updated = self
			.update_order_with(order_id, |o| {
				o.status = OrderStatus::Delivered;
				o.date_delivered = date.or_else(|| Some(Utc::now()));
			})
			.await?;

		tracing::info!(
			order_id = %truncate_id(order_id),
			order_number = %updated.order_number,
			"Order delivered"
		);
		Ok(DeliveredOutcome::Transitioned { order: updated })
	}

	/// Checks if a state transition is valid.
	fn is_valid_transition(from: &OrderStatus, to: &OrderStatus) -> bool {
		// Static transition table - each state maps to allowed next states
		static TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
			let mut m = HashMap::new();
			m.insert(OrderStatus::Pending, HashSet::from([OrderStatus::Shipped]));
			m.insert(OrderStatus::Shipped, HashSet::from([OrderStatus::Delivered]));
			m.insert(OrderStatus::Delivered, HashSet::new()); // terminal
			m
		});

		TRANSITIONS.get(from).is_some_and(|set| set.contains(to))
	}

	/// Gets an order by ID.
	pub async fn get_order(&self, order_id: &str) -> Result<Order, OrderStateError> {
		self.store
			.get_order(order_id)
			.await
			.map_err(|e| OrderStateError::from_storage(order_id, e))
	}
}
