//! Executor status callback DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::runner::Runner;
use crate::domain::status::StatusClass;

/// How the executor identifies the runner it reports on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunnerRef {
    Id(i64),
    Reference(String),
}

/// Status report from an executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub target: RunnerRef,
    /// Raw status in any source vocabulary
    pub status: String,
    #[serde(default)]
    pub pod_status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub pod_name: Option<String>,
    #[serde(default)]
    pub started_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_on: Option<DateTime<Utc>>,
    pub updated_by: i32,
}

/// Whether an applied update targets the pipeline's current execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disposition {
    Current,
    /// A newer trigger exists; the update was recorded for history only
    Superseded,
}

/// Result of applying a status update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusApplied {
    pub runner: Runner,
    pub class: StatusClass,
    pub disposition: Disposition,
    /// Reservations the caller should release, non-empty only on a terminal transition
    pub released_reservations: Vec<i64>,
}
