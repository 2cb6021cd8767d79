//! Order store for the WrapCRM tracking system.
//!
//! Provides the low-level key-value storage abstraction with in-memory and
//! file-based backends, and the typed [`OrderStore`] service the tracking
//! core uses. All order mutations go through a single read-modify-write
//! path guarded by a store-level lock, so status changes and notification
//! log appends are atomic per order.

use async_trait::async_trait;
use crm_types::{ConfigSchema, ImplementationRegistry, NotificationRecord, Order, Transition};
use thiserror::Error;
use tokio::sync::Mutex;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Namespace under which orders are stored.
pub const ORDERS_NAMESPACE: &str = "orders";

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// A requested item is not found.
	#[error("Not found")]
	NotFound,
	/// An insert collided with an existing record.
	#[error("Already exists: {0}")]
	AlreadyExists(String),
	/// Serialization/deserialization failure.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Failure in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Configuration validation failure.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Low-level interface for storage backends.
///
/// Backends store raw bytes under `namespace:id` keys and support listing
/// all keys in a namespace, which the sweeper's candidate query needs.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes under the given key, overwriting any prior value.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Lists all keys in the given namespace, in a stable order.
	async fn list_keys(&self, namespace: &str) -> Result<Vec<String>, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Typed order store used by the tracking core.
///
/// Wraps a storage backend with order-aware operations. A store-level async
/// mutex serializes every read-modify-write cycle: with a single service
/// instance this makes each order mutation atomic, so a status change can
/// never be persisted without its matching notification log state.
pub struct OrderStore {
	backend: Box<dyn StorageInterface>,
	write_lock: Mutex<()>,
}

impl OrderStore {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self {
			backend,
			write_lock: Mutex::new(()),
		}
	}

	fn key(order_id: &str) -> String {
		format!("{}:{}", ORDERS_NAMESPACE, order_id)
	}

	fn encode(order: &Order) -> Result<Vec<u8>, StorageError> {
		serde_json::to_vec(order).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	fn decode(bytes: &[u8]) -> Result<Order, StorageError> {
		serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Retrieves an order by id.
	pub async fn get_order(&self, order_id: &str) -> Result<Order, StorageError> {
		let bytes = self.backend.get_bytes(&Self::key(order_id)).await?;
		Self::decode(&bytes)
	}

	/// Inserts a new order, failing if the id is already taken.
	pub async fn insert_order(&self, order: &Order) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock().await;
		let key = Self::key(&order.id);
		if self.backend.exists(&key).await? {
			return Err(StorageError::AlreadyExists(order.id.clone()));
		}
		self.backend.set_bytes(&key, Self::encode(order)?).await
	}

	/// Applies a mutation to an order and persists the result atomically.
	///
	/// Returns the updated order. The closure runs while the store lock is
	/// held, so concurrent updates to the same order cannot interleave.
	pub async fn update_order_with<F>(
		&self,
		order_id: &str,
		updater: F,
	) -> Result<Order, StorageError>
	where
		F: FnOnce(&mut Order),
	{
		let _guard = self.write_lock.lock().await;
		let key = Self::key(order_id);
		let bytes = self.backend.get_bytes(&key).await?;
		let mut order = Self::decode(&bytes)?;

		updater(&mut order);

		self.backend.set_bytes(&key, Self::encode(&order)?).await?;
		Ok(order)
	}

	/// Returns all orders in `Shipped` status with a non-empty tracking
	/// number — the delivery sweeper's candidate set.
	///
	/// Orders that fail to deserialize are skipped with a warning rather
	/// than aborting the query; one corrupt record must not block the
	/// whole sweep.
	pub async fn find_shipped_with_tracking(&self) -> Result<Vec<Order>, StorageError> {
		let keys = self.backend.list_keys(ORDERS_NAMESPACE).await?;
		let mut candidates = Vec::new();

		for key in keys {
			let bytes = match self.backend.get_bytes(&key).await {
				Ok(bytes) => bytes,
				// Deleted between list and get; not a sweep concern
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e),
			};
			match Self::decode(&bytes) {
				Ok(order) if order.is_sweep_candidate() => candidates.push(order),
				Ok(_) => {},
				Err(e) => {
					tracing::warn!(key = %key, error = %e, "Skipping undecodable order record");
				},
			}
		}

		Ok(candidates)
	}

	/// Appends a notification record unless one already exists for the
	/// same transition.
	///
	/// Returns `true` if the record was appended, `false` if an entry for
	/// that transition was already present. The check and the append happen
	/// under the store lock, which is what makes the at-most-once
	/// notification invariant hold across overlapping sweeps.
	pub async fn append_notification_if_absent(
		&self,
		order_id: &str,
		record: NotificationRecord,
	) -> Result<bool, StorageError> {
		let _guard = self.write_lock.lock().await;
		let key = Self::key(order_id);
		let bytes = self.backend.get_bytes(&key).await?;
		let mut order = Self::decode(&bytes)?;

		if order.has_notification(record.transition) {
			return Ok(false);
		}

		order.notifications.push(record);
		self.backend.set_bytes(&key, Self::encode(&order)?).await?;
		Ok(true)
	}

	/// Returns the notification record for a given transition, if any.
	pub async fn get_notification(
		&self,
		order_id: &str,
		transition: Transition,
	) -> Result<Option<NotificationRecord>, StorageError> {
		let order = self.get_order(order_id).await?;
		Ok(order
			.notifications
			.into_iter()
			.find(|n| n.transition == transition))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crm_types::{Address, Customer, OrderStatus, ProductType};
	use implementations::memory::MemoryStorage;

	fn test_order(id: &str, status: OrderStatus, tracking: Option<&str>) -> Order {
		Order {
			id: id.to_string(),
			order_number: format!("WRP-{}", id),
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
			created_at: 1,
			updated_at: 1,
		}
	}

	fn memory_store() -> OrderStore {
		OrderStore::new(Box::new(MemoryStorage::new()))
	}

	#[tokio::test]
	async fn insert_and_get_roundtrip() {
		let store = memory_store();
		let order = test_order("a1", OrderStatus::Pending, None);
		store.insert_order(&order).await.unwrap();

		let loaded = store.get_order("a1").await.unwrap();
		assert_eq!(loaded.order_number, "WRP-a1");
		assert_eq!(loaded.status, OrderStatus::Pending);
	}

	#[tokio::test]
	async fn duplicate_insert_rejected() {
		let store = memory_store();
		let order = test_order("a1", OrderStatus::Pending, None);
		store.insert_order(&order).await.unwrap();

		let result = store.insert_order(&order).await;
		assert!(matches!(result, Err(StorageError::AlreadyExists(_))));
	}

	#[tokio::test]
	async fn find_shipped_filters_candidates() {
		let store = memory_store();
		store
			.insert_order(&test_order("p1", OrderStatus::Pending, None))
			.await
			.unwrap();
		store
			.insert_order(&test_order("s1", OrderStatus::Shipped, Some("9400A")))
			.await
			.unwrap();
		store
			.insert_order(&test_order("s2", OrderStatus::Shipped, None))
			.await
			.unwrap();
		store
			.insert_order(&test_order("d1", OrderStatus::Delivered, Some("9400B")))
			.await
			.unwrap();

		let candidates = store.find_shipped_with_tracking().await.unwrap();
		assert_eq!(candidates.len(), 1);
		assert_eq!(candidates[0].id, "s1");
	}

	#[tokio::test]
	async fn update_order_with_persists() {
		let store = memory_store();
		store
			.insert_order(&test_order("s1", OrderStatus::Shipped, Some("9400A")))
			.await
			.unwrap();

		let updated = store
			.update_order_with("s1", |o| {
				o.status = OrderStatus::Delivered;
				o.updated_at = 42;
			})
			.await
			.unwrap();
		assert_eq!(updated.status, OrderStatus::Delivered);

		let loaded = store.get_order("s1").await.unwrap();
		assert_eq!(loaded.status, OrderStatus::Delivered);
		assert_eq!(loaded.updated_at, 42);
	}

	#[tokio::test]
	async fn notification_append_is_once_per_transition() {
		let store = memory_store();
		store
			.insert_order(&test_order("s1", OrderStatus::Shipped, Some("9400A")))
			.await
			.unwrap();

		let record = NotificationRecord {
			transition: Transition::Delivered,
			email_sent: true,
			timestamp: 100,
			error: None,
		};
		assert!(store
			.append_notification_if_absent("s1", record.clone())
			.await
			.unwrap());
		// Second attempt for the same transition is refused
		assert!(!store
			.append_notification_if_absent("s1", record)
			.await
			.unwrap());

		let order = store.get_order("s1").await.unwrap();
		assert_eq!(order.notifications.len(), 1);

		// A different transition still gets its own entry
		let shipped = NotificationRecord {
			transition: Transition::Shipped,
			email_sent: false,
			timestamp: 101,
			error: Some("mailer down".into()),
		};
		assert!(store
			.append_notification_if_absent("s1", shipped)
			.await
			.unwrap());
		let order = store.get_order("s1").await.unwrap();
		assert_eq!(order.notifications.len(), 2);
	}

	#[tokio::test]
	async fn update_missing_order_not_found() {
		let store = memory_store();
		let result = store.update_order_with("ghost", |_| {}).await;
		assert!(matches!(result, Err(StorageError::NotFound)));
	}
}
