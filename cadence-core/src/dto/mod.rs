//! Data Transfer Objects
//!
//! Shapes exchanged with the orchestrator's callers: the trigger API, the
//! executor status callback and the reconciliation scheduler.

pub mod reconcile;
pub mod status;
pub mod trigger;
