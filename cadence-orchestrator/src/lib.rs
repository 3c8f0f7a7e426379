//! Cadence Orchestrator
//!
//! Tracks deployment runners triggered against delivery pipelines: trigger
//! intake with queue draining, executor status callbacks, retry chains and
//! the reconciliation sweep for poll-based applications.

pub mod config;
pub mod db;
pub mod error;
pub mod repository;
pub mod service;
