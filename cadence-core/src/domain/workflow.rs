//! Workflow domain types

use serde::{Deserialize, Serialize};

use crate::domain::AuditLog;

/// One deployment trigger event bound to an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: i64,
    pub artifact_id: i64,
    pub pipeline_id: i64,
    pub status: WorkflowStatus,
    pub audit: AuditLog,
}

/// Trigger-level lifecycle of a workflow
///
/// Persisted as the variant's discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowStatus {
    Unknown = 0,
    RequestAccepted = 1,
    Enqueued = 2,
    QueueError = 3,
    Started = 4,
    DroppedStale = 5,
    DequeueError = 6,
    TriggerError = 7,
}

impl WorkflowStatus {
    pub fn code(self) -> i16 {
        self as i16
    }

    pub fn from_code(code: i16) -> Self {
        match code {
            1 => WorkflowStatus::RequestAccepted,
            2 => WorkflowStatus::Enqueued,
            3 => WorkflowStatus::QueueError,
            4 => WorkflowStatus::Started,
            5 => WorkflowStatus::DroppedStale,
            6 => WorkflowStatus::DequeueError,
            7 => WorkflowStatus::TriggerError,
            _ => WorkflowStatus::Unknown,
        }
    }
}
