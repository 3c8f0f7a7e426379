//! Retry Service
//!
//! Retry chains are append-only: a retry is a new runner in the same workflow
//! pointing at the runner it retries.

use cadence_core::domain::status::StatusClass;
use cadence_core::dto::trigger::{TriggerOutcome, TriggerRequest};
use thiserror::Error;

use crate::error::{StoreError, StoreResult};
use crate::repository::WorkflowRepository;
use crate::service::trigger::{self, TriggerError};

/// Retry service error type
#[derive(Debug, Error)]
pub enum RetryError {
    #[error("runner {0} not found")]
    RunnerNotFound(i64),

    #[error("{0}")]
    InvalidState(String),

    #[error(transparent)]
    Trigger(#[from] TriggerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Number of retries created for a runner
pub async fn retry_count(repo: &dyn WorkflowRepository, runner_id: i64) -> StoreResult<i64> {
    repo.retry_count(runner_id).await
}

/// Whether a trigger with this reference id was already delivered
///
/// A failed lookup is an error, never `false`.
pub async fn is_duplicate_trigger(
    repo: &dyn WorkflowRepository,
    reference_id: &str,
) -> StoreResult<bool> {
    repo.reference_id_exists(reference_id).await
}

/// Queue a retry of a failed runner
pub async fn retry_runner(
    repo: &dyn WorkflowRepository,
    runner_id: i64,
    triggered_by: i32,
    reference_id: Option<String>,
) -> Result<TriggerOutcome, RetryError> {
    let runner = repo
        .find_runner(runner_id)
        .await?
        .ok_or(RetryError::RunnerNotFound(runner_id))?;

    if runner.status.class() != StatusClass::TerminalFailure {
        return Err(RetryError::InvalidState(format!(
            "Runner {} cannot be retried from status {}",
            runner_id, runner.status
        )));
    }

    let workflow = repo
        .find_workflow(runner.workflow_id)
        .await?
        .ok_or_else(|| StoreError::not_found("workflow", runner.workflow_id))?;

    let attempt = repo.retry_count(runner_id).await? + 1;
    tracing::info!("Retrying runner {} (attempt {})", runner_id, attempt);

    let req = TriggerRequest {
        pipeline_id: workflow.pipeline_id,
        artifact_id: workflow.artifact_id,
        stage: runner.stage_type,
        triggered_by,
        name: runner.name,
        executor_kind: runner.executor_kind,
        reference_id,
        predecessor_runner_id: Some(runner.id),
        workflow_id: Some(workflow.id),
        namespace: runner.namespace,
        log_location: runner.log_location,
        reservation_ids: Vec::new(),
        blob_storage_enabled: runner.blob_storage_enabled,
    };

    Ok(trigger::trigger_stage(repo, req).await?)
}
