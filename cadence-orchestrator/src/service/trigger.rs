//! Trigger Service
//!
//! Turns a trigger request into a workflow and a queued runner, superseding
//! whatever is still queued for the pipeline.

use cadence_core::domain::status::RunnerStatus;
use cadence_core::domain::workflow::WorkflowStatus;
use cadence_core::dto::trigger::{
    NewRunner, NewTrigger, NewWorkflow, TriggerOutcome, TriggerRequest, TriggerTarget,
};
use thiserror::Error;

use crate::error::StoreError;
use crate::repository::{REFERENCE_ID_CONSTRAINT, WorkflowRepository};

/// Trigger service error type
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("pipeline {0} not found")]
    PipelineNotFound(i64),

    #[error("pipeline {0} is deleted")]
    PipelineDeleted(i64),

    #[error("invalid trigger: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Create a runner for the requested stage
///
/// A reference id that was already delivered yields
/// [`TriggerOutcome::Duplicate`] and writes nothing.
pub async fn trigger_stage(
    repo: &dyn WorkflowRepository,
    req: TriggerRequest,
) -> Result<TriggerOutcome, TriggerError> {
    if req.name.trim().is_empty() {
        return Err(TriggerError::Validation("runner name cannot be empty".to_string()));
    }

    let pipeline = repo
        .find_pipeline(req.pipeline_id)
        .await?
        .ok_or(TriggerError::PipelineNotFound(req.pipeline_id))?;

    if pipeline.deleted {
        return Err(TriggerError::PipelineDeleted(pipeline.id));
    }

    if let Some(reference_id) = &req.reference_id {
        if repo.reference_id_exists(reference_id).await? {
            tracing::info!(
                "Ignoring redelivered trigger {} for pipeline {}",
                reference_id,
                pipeline.id
            );
            return Ok(TriggerOutcome::Duplicate {
                reference_id: reference_id.clone(),
            });
        }
    }

    if let Some(predecessor_id) = req.predecessor_runner_id {
        let predecessor = repo.find_runner(predecessor_id).await?.ok_or_else(|| {
            TriggerError::Validation(format!("predecessor runner {} not found", predecessor_id))
        })?;

        if predecessor.stage_type != req.stage {
            return Err(TriggerError::Validation(format!(
                "predecessor runner {} is a {} runner, not {}",
                predecessor_id,
                predecessor.stage_type.as_str(),
                req.stage.as_str()
            )));
        }
    }

    let target = match req.workflow_id {
        Some(workflow_id) => {
            let workflow = repo.find_workflow(workflow_id).await?.ok_or_else(|| {
                TriggerError::Validation(format!("workflow {} not found", workflow_id))
            })?;

            if workflow.pipeline_id != pipeline.id {
                return Err(TriggerError::Validation(format!(
                    "workflow {} belongs to pipeline {}, not {}",
                    workflow_id, workflow.pipeline_id, pipeline.id
                )));
            }

            TriggerTarget::Existing {
                workflow_id,
                pipeline_id: pipeline.id,
            }
        }
        None => TriggerTarget::NewWorkflow(NewWorkflow {
            artifact_id: req.artifact_id,
            pipeline_id: pipeline.id,
            status: WorkflowStatus::Enqueued,
            created_by: req.triggered_by,
        }),
    };

    let trigger = NewTrigger {
        target,
        runner: NewRunner {
            workflow_id: req.workflow_id.unwrap_or_default(),
            name: req.name,
            stage_type: req.stage,
            executor_kind: req.executor_kind,
            status: RunnerStatus::Queued,
            message: String::new(),
            started_on: None,
            namespace: req.namespace,
            log_location: req.log_location,
            triggered_by: req.triggered_by,
            blob_storage_enabled: req.blob_storage_enabled,
            reservation_ids: req.reservation_ids,
            reference_id: req.reference_id.clone(),
            predecessor_runner_id: req.predecessor_runner_id,
        },
    };

    let created = match repo.create_trigger(trigger).await {
        Ok(created) => created,
        // Lost a race with a concurrent delivery of the same reference id
        Err(err) if err.violates(REFERENCE_ID_CONSTRAINT) => {
            let reference_id = req.reference_id.unwrap_or_default();
            tracing::info!("Ignoring concurrent redelivery of trigger {}", reference_id);
            return Ok(TriggerOutcome::Duplicate { reference_id });
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!(
        "Runner {} ({}) queued in workflow {} for pipeline {}",
        created.runner.id,
        created.runner.stage_type.as_str(),
        created.workflow.id,
        pipeline.id
    );

    if !created.superseded.is_empty() {
        tracing::info!(
            "Runner {} superseded queued runner(s) {:?}",
            created.runner.id,
            created.superseded
        );
    }

    Ok(TriggerOutcome::Created {
        workflow_id: created.workflow.id,
        runner_id: created.runner.id,
        superseded: created.superseded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryWorkflowRepository;
    use cadence_core::domain::pipeline::{DeploymentAppType, Pipeline};
    use cadence_core::domain::runner::{ExecutorKind, SUPERSEDED_MESSAGE, StageType};

    fn pipeline(id: i64) -> Pipeline {
        Pipeline {
            id,
            app_id: 100 + id,
            environment_id: 2,
            deleted: false,
            run_pre_stage_in_env: true,
            run_post_stage_in_env: false,
            deployment_app_name: format!("web-{}", id),
            deployment_app_type: DeploymentAppType::Helm,
        }
    }

    fn request(pipeline_id: i64, stage: StageType) -> TriggerRequest {
        TriggerRequest {
            pipeline_id,
            artifact_id: 9,
            stage,
            triggered_by: 4,
            name: format!("web-{}-{}", pipeline_id, stage.as_str().to_lowercase()),
            executor_kind: ExecutorKind::ExternalEngine,
            reference_id: None,
            predecessor_runner_id: None,
            workflow_id: None,
            namespace: Some("cd-workloads".to_string()),
            log_location: None,
            reservation_ids: vec![11, 12],
            blob_storage_enabled: false,
        }
    }

    fn created(outcome: TriggerOutcome) -> (i64, i64, Vec<i64>) {
        match outcome {
            TriggerOutcome::Created {
                workflow_id,
                runner_id,
                superseded,
            } => (workflow_id, runner_id, superseded),
            other => panic!("expected Created, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_trigger_creates_enqueued_workflow() {
        let repo = InMemoryWorkflowRepository::new();
        repo.insert_pipeline(pipeline(1)).await;

        let (workflow_id, runner_id, superseded) =
            created(trigger_stage(&repo, request(1, StageType::Deploy)).await.unwrap());

        assert!(superseded.is_empty());
        let workflow = repo.find_workflow(workflow_id).await.unwrap().unwrap();
        assert_eq!(workflow.status, WorkflowStatus::Enqueued);
        assert_eq!(workflow.audit.created_by, 4);

        let runner = repo.find_runner(runner_id).await.unwrap().unwrap();
        assert_eq!(runner.status, RunnerStatus::Queued);
        assert_eq!(runner.reservation_ids, vec![11, 12]);
        assert_eq!(runner.namespace.as_deref(), Some("cd-workloads"));
    }

    #[tokio::test]
    async fn test_newer_deploy_supersedes_queue() {
        let repo = InMemoryWorkflowRepository::new();
        repo.insert_pipeline(pipeline(1)).await;

        let (_, first, _) =
            created(trigger_stage(&repo, request(1, StageType::Deploy)).await.unwrap());
        let (_, second, superseded) =
            created(trigger_stage(&repo, request(1, StageType::Deploy)).await.unwrap());

        assert_eq!(superseded, vec![first]);
        let drained = repo.find_runner(first).await.unwrap().unwrap();
        assert_eq!(drained.status, RunnerStatus::Failed);
        assert_eq!(drained.message, SUPERSEDED_MESSAGE);
        assert!(repo.is_latest_runner(1, second).await.unwrap());
    }

    #[tokio::test]
    async fn test_redelivered_reference_is_duplicate() {
        let repo = InMemoryWorkflowRepository::new();
        repo.insert_pipeline(pipeline(1)).await;

        let mut req = request(1, StageType::Deploy);
        req.reference_id = Some("evt-7".to_string());

        created(trigger_stage(&repo, req.clone()).await.unwrap());
        let again = trigger_stage(&repo, req).await.unwrap();

        assert_eq!(
            again,
            TriggerOutcome::Duplicate {
                reference_id: "evt-7".to_string()
            }
        );
        assert_eq!(repo.list_runners_by_pipeline(1, 0, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_and_deleted_pipeline() {
        let repo = InMemoryWorkflowRepository::new();
        let mut deleted = pipeline(2);
        deleted.deleted = true;
        repo.insert_pipeline(deleted).await;

        let err = trigger_stage(&repo, request(1, StageType::Deploy)).await.unwrap_err();
        assert!(matches!(err, TriggerError::PipelineNotFound(1)));

        let err = trigger_stage(&repo, request(2, StageType::Deploy)).await.unwrap_err();
        assert!(matches!(err, TriggerError::PipelineDeleted(2)));
    }

    #[tokio::test]
    async fn test_deploy_attaches_to_pre_stage_workflow() {
        let repo = InMemoryWorkflowRepository::new();
        repo.insert_pipeline(pipeline(1)).await;
        repo.insert_pipeline(pipeline(2)).await;

        let (workflow_id, pre_id, _) =
            created(trigger_stage(&repo, request(1, StageType::Pre)).await.unwrap());

        let mut deploy = request(1, StageType::Deploy);
        deploy.workflow_id = Some(workflow_id);
        let (same_workflow, deploy_id, _) = created(trigger_stage(&repo, deploy).await.unwrap());

        assert_eq!(same_workflow, workflow_id);
        assert!(deploy_id > pre_id);

        let mut foreign = request(2, StageType::Deploy);
        foreign.workflow_id = Some(workflow_id);
        let err = trigger_stage(&repo, foreign).await.unwrap_err();
        assert!(matches!(err, TriggerError::Validation(_)));
    }

    #[tokio::test]
    async fn test_predecessor_must_exist_and_match_stage() {
        let repo = InMemoryWorkflowRepository::new();
        repo.insert_pipeline(pipeline(1)).await;

        let mut req = request(1, StageType::Deploy);
        req.predecessor_runner_id = Some(50);
        let err = trigger_stage(&repo, req).await.unwrap_err();
        assert!(matches!(err, TriggerError::Validation(_)));

        let (_, pre_id, _) =
            created(trigger_stage(&repo, request(1, StageType::Pre)).await.unwrap());
        let mut req = request(1, StageType::Deploy);
        req.predecessor_runner_id = Some(pre_id);
        let err = trigger_stage(&repo, req).await.unwrap_err();
        assert!(matches!(err, TriggerError::Validation(_)));
    }

    #[tokio::test]
    async fn test_empty_name_is_rejected() {
        let repo = InMemoryWorkflowRepository::new();
        repo.insert_pipeline(pipeline(1)).await;

        let mut req = request(1, StageType::Post);
        req.name = "  ".to_string();
        let err = trigger_stage(&repo, req).await.unwrap_err();
        assert!(matches!(err, TriggerError::Validation(_)));
    }
}
