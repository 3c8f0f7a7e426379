//! Cadence Core
//!
//! Core types for the Cadence deployment orchestrator.
//!
//! This crate contains:
//! - Domain types: pipelines, workflows, runners and the status taxonomy
//! - DTOs: trigger requests, executor status callbacks, reconciliation candidates

pub mod domain;
pub mod dto;
