//! Reconciliation sweep DTOs

use serde::{Deserialize, Serialize};

use crate::domain::runner::Runner;

/// A deploy runner the sweep wants re-polled against cluster state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepollCandidate {
    pub pipeline_id: i64,
    pub app_id: i64,
    pub environment_id: i64,
    pub deployment_app_name: String,
    pub runner: Runner,
}
