//! Core orchestration for the WrapCRM tracking system.
//!
//! Ties the pluggable pieces together: the order state machine guards the
//! lifecycle, the delivery sweeper walks shipped orders against the carrier,
//! and the builder assembles everything from configuration.

pub mod builder;
pub mod state;
pub mod sweep;

pub use builder::{BuilderError, Crm, CrmBuilder, CrmFactories};
pub use state::{DeliveredOutcome, OrderStateError, OrderStateMachine};
pub use sweep::{DeliverySweeper, SweepError};
