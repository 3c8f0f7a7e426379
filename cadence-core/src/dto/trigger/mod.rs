//! Trigger DTOs
//!
//! Requests coming from the trigger API and the insert shapes the store
//! accepts for new workflows and runners.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::runner::{ExecutorKind, StageType};
use crate::domain::status::RunnerStatus;
use crate::domain::workflow::WorkflowStatus;

/// Request to trigger a stage for a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub pipeline_id: i64,
    pub artifact_id: i64,
    pub stage: StageType,
    pub triggered_by: i32,

    /// Display name of the runner
    pub name: String,

    #[serde(default = "default_executor_kind")]
    pub executor_kind: ExecutorKind,

    /// Correlation id from the upstream trigger source, used for redelivery detection
    #[serde(default)]
    pub reference_id: Option<String>,

    /// Runner being retried, if this is a retry
    #[serde(default)]
    pub predecessor_runner_id: Option<i64>,

    /// Attach to an existing workflow instead of creating one
    /// (e.g. the deploy stage after a pre-deploy stage)
    #[serde(default)]
    pub workflow_id: Option<i64>,

    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub log_location: Option<String>,

    #[serde(default)]
    pub reservation_ids: Vec<i64>,

    #[serde(default)]
    pub blob_storage_enabled: bool,
}

fn default_executor_kind() -> ExecutorKind {
    ExecutorKind::ExternalEngine
}

/// Result of a trigger request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerOutcome {
    Created {
        workflow_id: i64,
        runner_id: i64,
        /// Queued runners failed because this trigger supersedes them
        superseded: Vec<i64>,
    },
    /// The reference id was already delivered; nothing was created
    Duplicate { reference_id: String },
}

/// Insert shape for a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkflow {
    pub artifact_id: i64,
    pub pipeline_id: i64,
    pub status: WorkflowStatus,
    pub created_by: i32,
}

/// Insert shape for a runner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRunner {
    pub workflow_id: i64,
    pub name: String,
    pub stage_type: StageType,
    pub executor_kind: ExecutorKind,
    pub status: RunnerStatus,
    pub message: String,
    pub started_on: Option<DateTime<Utc>>,
    pub namespace: Option<String>,
    pub log_location: Option<String>,
    pub triggered_by: i32,
    pub blob_storage_enabled: bool,
    pub reservation_ids: Vec<i64>,
    pub reference_id: Option<String>,
    pub predecessor_runner_id: Option<i64>,
}

impl NewRunner {
    /// A freshly queued runner for `workflow_id`
    pub fn queued(
        workflow_id: i64,
        name: impl Into<String>,
        stage_type: StageType,
        triggered_by: i32,
    ) -> Self {
        Self {
            workflow_id,
            name: name.into(),
            stage_type,
            executor_kind: ExecutorKind::ExternalEngine,
            status: RunnerStatus::Queued,
            message: String::new(),
            started_on: None,
            namespace: None,
            log_location: None,
            triggered_by,
            blob_storage_enabled: false,
            reservation_ids: Vec::new(),
            reference_id: None,
            predecessor_runner_id: None,
        }
    }
}

/// Where the runner of a trigger goes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TriggerTarget {
    /// Create a new workflow for the runner
    NewWorkflow(NewWorkflow),
    /// Attach the runner to an existing workflow
    Existing { workflow_id: i64, pipeline_id: i64 },
}

/// Everything written by one trigger, applied in a single transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTrigger {
    pub target: TriggerTarget,
    /// `workflow_id` is ignored when the target is a new workflow
    pub runner: NewRunner,
}

impl NewTrigger {
    pub fn pipeline_id(&self) -> i64 {
        match &self.target {
            TriggerTarget::NewWorkflow(wf) => wf.pipeline_id,
            TriggerTarget::Existing { pipeline_id, .. } => *pipeline_id,
        }
    }
}
