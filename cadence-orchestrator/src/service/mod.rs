//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services take any [`crate::repository::WorkflowRepository`] and hold no state.

pub mod reconcile;
pub mod retry;
pub mod status;
pub mod trigger;

pub use reconcile::{ReconcileError, Reconciler, RepollHandler};
pub use retry::RetryError;
pub use status::StatusError;
pub use trigger::TriggerError;
