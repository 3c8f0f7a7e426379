//! Status Service
//!
//! Applies executor status callbacks to runners. Every update is recorded;
//! only updates for the pipeline's current execution advance the workflow.

use cadence_core::domain::runner::StageType;
use cadence_core::domain::status::RunnerStatus;
use cadence_core::domain::workflow::WorkflowStatus;
use cadence_core::dto::status::{Disposition, RunnerRef, StatusApplied, StatusUpdate};
use chrono::Utc;
use thiserror::Error;

use crate::error::StoreError;
use crate::repository::WorkflowRepository;

/// Status service error type
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("runner {0} not found")]
    RunnerNotFound(String),

    #[error("workflow {0} not found")]
    WorkflowNotFound(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Apply one status report from an executor
pub async fn apply_status_update(
    repo: &dyn WorkflowRepository,
    update: StatusUpdate,
) -> Result<StatusApplied, StatusError> {
    let found = match &update.target {
        RunnerRef::Id(id) => repo.find_runner(*id).await?,
        RunnerRef::Reference(reference) => repo.find_runner_by_reference_id(reference).await?,
    };
    let mut runner =
        found.ok_or_else(|| StatusError::RunnerNotFound(describe(&update.target)))?;

    let workflow = repo
        .find_workflow(runner.workflow_id)
        .await?
        .ok_or(StatusError::WorkflowNotFound(runner.workflow_id))?;

    let reported = RunnerStatus::parse(&update.status);
    // A terminal runner is never reopened
    let reopens = runner.status.is_terminal() && !reported.is_terminal();
    if reopens {
        tracing::warn!(
            "Runner {} is already {}; keeping it over reported {}",
            runner.id,
            runner.status,
            reported
        );
    }
    let status = if reopens { runner.status.clone() } else { reported };
    let class = status.class();
    let now = Utc::now();

    if let Some(pod_status) = update.pod_status {
        runner.pod_status = Some(pod_status);
    }
    if let Some(pod_name) = update.pod_name {
        runner.pod_name = Some(pod_name);
    }

    let mut released_reservations = Vec::new();
    if !reopens {
        if let Some(message) = update.message {
            runner.message = message;
        }

        if update.started_on.is_some() {
            runner.started_on = update.started_on;
        } else if runner.started_on.is_none() && !status.is_pending() {
            runner.started_on = Some(now);
        }

        if class.is_terminal() {
            runner.finished_on = update.finished_on.or(runner.finished_on).or(Some(now));
            released_reservations = std::mem::take(&mut runner.reservation_ids);
        }
    }

    runner.status = status;
    runner.audit.updated_by = update.updated_by;

    let current = match runner.stage_type {
        StageType::Deploy => repo.is_latest_runner(workflow.pipeline_id, runner.id).await?,
        StageType::Pre | StageType::Post => {
            repo.is_latest_workflow(workflow.pipeline_id, workflow.id).await?
        }
    };

    let runner = repo.update_runner(&runner).await?;
    // The store keeps a status a concurrent drain made terminal
    let reopens = reopens || (runner.status.is_terminal() && !class.is_terminal());
    let class = runner.status.class();

    let disposition = if current {
        let starts = !reopens && !runner.status.is_pending();
        if starts && workflow.status == WorkflowStatus::Enqueued {
            repo.update_workflow_status(workflow.id, WorkflowStatus::Started, update.updated_by)
                .await?;
            tracing::info!("Workflow {} started", workflow.id);
        }
        Disposition::Current
    } else {
        tracing::warn!(
            "Runner {} reported {} after a newer trigger on pipeline {}; recorded for history",
            runner.id,
            runner.status,
            workflow.pipeline_id
        );
        Disposition::Superseded
    };

    tracing::debug!(
        "Runner {} is now {} ({:?})",
        runner.id,
        runner.status,
        class
    );

    Ok(StatusApplied {
        runner,
        class,
        disposition,
        released_reservations,
    })
}

fn describe(target: &RunnerRef) -> String {
    match target {
        RunnerRef::Id(id) => id.to_string(),
        RunnerRef::Reference(reference) => format!("with reference {}", reference),
    }
}
