//! Order state management.

pub mod order;

pub use order::{DeliveredOutcome, OrderStateError, OrderStateMachine};
