//! Registry trait for self-registering implementations.
//!
//! Each pluggable module (storage backends, tracking providers, mailers)
//! provides a `Registry` struct implementing this trait, declaring the name
//! used in configuration files together with a factory function.

/// Base trait for implementation registries.
///
/// The name must match the key used in the TOML configuration, for example:
/// - "usps_api" for `tracking.implementations.usps_api`
/// - "memory" for `storage.implementations.memory`
/// - "http" for `notification.implementations.http`
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	///
	/// Each module defines its own factory type, for example
	/// `TrackingFactory` for tracking providers or `StorageFactory` for
	/// storage backends.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}
