//! Common types for the WrapCRM tracking system.
//!
//! This crate defines the core data types shared across the CRM components.
//! It provides a centralized location for the order model, carrier tracking
//! envelopes, notification records, and the configuration validation
//! framework used by every pluggable implementation.

/// Order model: shipment orders, statuses, customers, notification records.
pub mod order;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Secure string type for carrier credentials and mail API keys.
pub mod secret_string;
/// Sweep report types returned by the delivery sweeper.
pub mod sweep;
/// Carrier tracking types: raw provider envelopes and normalized statuses.
pub mod tracking;
/// Small shared helpers for formatting and timestamps.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

// Re-export all types for convenient access
pub use order::*;
pub use registry::*;
pub use secret_string::SecretString;
pub use sweep::*;
pub use tracking::*;
pub use utils::{current_timestamp, truncate_id};
pub use validation::*;
