//! Runner domain model
//!
//! A runner is one stage execution (pre-deploy, deploy or post-deploy) of a
//! workflow, carried out by an external executor. Rows are append-only:
//! retries create new runners pointing at the one they retry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::AuditLog;
use crate::domain::status::RunnerStatus;

/// Longest message persisted on a runner, in characters
pub const MESSAGE_LIMIT: usize = 1000;

/// Message written to runners drained from the queue by a newer trigger
pub const SUPERSEDED_MESSAGE: &str =
    "A new deployment was initiated before this deployment completed!";

/// One stage execution of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Runner {
    pub id: i64,
    pub name: String,
    pub stage_type: StageType,
    pub executor_kind: ExecutorKind,
    pub status: RunnerStatus,
    pub pod_status: Option<String>,
    pub message: String,
    pub started_on: Option<DateTime<Utc>>,
    pub finished_on: Option<DateTime<Utc>>,
    pub namespace: Option<String>,
    pub log_location: Option<String>,
    pub pod_name: Option<String>,
    pub triggered_by: i32,
    pub workflow_id: i64,
    pub blob_storage_enabled: bool,

    /// Artifact path reservations held until the runner reaches a terminal state
    pub reservation_ids: Vec<i64>,

    /// External correlation id, unique when present
    pub reference_id: Option<String>,

    /// Runner this one retries
    pub predecessor_runner_id: Option<i64>,

    pub audit: AuditLog,
}

impl Runner {
    pub fn is_retry(&self) -> bool {
        self.predecessor_runner_id.is_some()
    }
}

/// Stage of a deployment workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageType {
    Pre,
    Deploy,
    Post,
}

impl StageType {
    pub fn as_str(self) -> &'static str {
        match self {
            StageType::Pre => "PRE",
            StageType::Deploy => "DEPLOY",
            StageType::Post => "POST",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PRE" => Some(StageType::Pre),
            "DEPLOY" => Some(StageType::Deploy),
            "POST" => Some(StageType::Post),
            _ => None,
        }
    }
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who carries out the runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutorKind {
    /// Submitted to an external workflow engine
    ExternalEngine,
    /// Executed directly by the platform
    Direct,
}

impl ExecutorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutorKind::ExternalEngine => "AWF",
            ExecutorKind::Direct => "SYSTEM",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "AWF" => Some(ExecutorKind::ExternalEngine),
            "SYSTEM" => Some(ExecutorKind::Direct),
            _ => None,
        }
    }
}

/// Cut a message down to [`MESSAGE_LIMIT`] characters
pub fn truncate_message(message: &str) -> String {
    match message.char_indices().nth(MESSAGE_LIMIT) {
        Some((byte_idx, _)) => message[..byte_idx].to_string(),
        None => message.to_string(),
    }
}
