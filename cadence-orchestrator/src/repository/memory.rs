//! In-memory Workflow Repository
//!
//! Keeps every table in process memory behind one async mutex, which plays
//! the role the database plays for [`super::PgWorkflowRepository`]. Multi-row
//! writes are staged on a copy of the state and swapped in on success, so a
//! failed batch leaves nothing behind.

use async_trait::async_trait;
use cadence_core::domain::AuditLog;
use cadence_core::domain::pipeline::{DeploymentAppType, ExecutionConfig, Pipeline};
use cadence_core::domain::runner::{Runner, StageType, SUPERSEDED_MESSAGE, truncate_message};
use cadence_core::domain::status::RunnerStatus;
use cadence_core::domain::workflow::{Workflow, WorkflowStatus};
use cadence_core::dto::reconcile::RepollCandidate;
use cadence_core::dto::trigger::{NewRunner, NewTrigger, NewWorkflow, TriggerTarget};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use super::{
    CreatedTrigger, REFERENCE_ID_CONSTRAINT, RUNNER_PREDECESSOR_FK, RUNNER_WORKFLOW_FK,
    WORKFLOW_PIPELINE_FK, WorkflowRepository,
};
use crate::error::{StoreError, StoreResult};

/// Process-local [`WorkflowRepository`]
#[derive(Debug, Default)]
pub struct InMemoryWorkflowRepository {
    state: Mutex<MemoryState>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pipeline (reference data owned by another service)
    pub async fn insert_pipeline(&self, pipeline: Pipeline) {
        self.state.lock().await.pipelines.insert(pipeline.id, pipeline);
    }

    /// Register a pipeline's execution config
    pub async fn insert_config(&self, config: ExecutionConfig) {
        self.state.lock().await.configs.insert(config.pipeline_id, config);
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    pipelines: BTreeMap<i64, Pipeline>,
    configs: BTreeMap<i64, ExecutionConfig>,
    workflows: BTreeMap<i64, Workflow>,
    runners: BTreeMap<i64, Runner>,
    last_workflow_id: i64,
    last_runner_id: i64,
}

impl MemoryState {
    fn insert_workflow(&mut self, wf: &NewWorkflow) -> StoreResult<Workflow> {
        if !self.pipelines.contains_key(&wf.pipeline_id) {
            return Err(StoreError::constraint(
                WORKFLOW_PIPELINE_FK,
                format!("pipeline {} does not exist", wf.pipeline_id),
            ));
        }

        self.last_workflow_id += 1;
        let workflow = Workflow {
            id: self.last_workflow_id,
            artifact_id: wf.artifact_id,
            pipeline_id: wf.pipeline_id,
            status: wf.status,
            audit: AuditLog::created_now(wf.created_by),
        };
        self.workflows.insert(workflow.id, workflow.clone());

        Ok(workflow)
    }

    fn insert_runner(&mut self, new: &NewRunner) -> StoreResult<Runner> {
        if !self.workflows.contains_key(&new.workflow_id) {
            return Err(StoreError::constraint(
                RUNNER_WORKFLOW_FK,
                format!("workflow {} does not exist", new.workflow_id),
            ));
        }
        self.check_references(new.predecessor_runner_id, new.reference_id.as_deref(), None)?;

        self.last_runner_id += 1;
        let runner = Runner {
            id: self.last_runner_id,
            name: new.name.clone(),
            stage_type: new.stage_type,
            executor_kind: new.executor_kind,
            status: new.status.clone(),
            pod_status: None,
            message: truncate_message(&new.message),
            started_on: new.started_on,
            finished_on: None,
            namespace: new.namespace.clone(),
            log_location: new.log_location.clone(),
            pod_name: None,
            triggered_by: new.triggered_by,
            workflow_id: new.workflow_id,
            blob_storage_enabled: new.blob_storage_enabled,
            reservation_ids: new.reservation_ids.clone(),
            reference_id: new.reference_id.clone(),
            predecessor_runner_id: new.predecessor_runner_id,
            audit: AuditLog::created_now(new.triggered_by),
        };
        self.runners.insert(runner.id, runner.clone());

        Ok(runner)
    }

    fn check_references(
        &self,
        predecessor: Option<i64>,
        reference_id: Option<&str>,
        own_id: Option<i64>,
    ) -> StoreResult<()> {
        if let Some(pred) = predecessor {
            if !self.runners.contains_key(&pred) {
                return Err(StoreError::constraint(
                    RUNNER_PREDECESSOR_FK,
                    format!("runner {} does not exist", pred),
                ));
            }
        }

        if let Some(reference) = reference_id {
            let taken = self
                .runners
                .values()
                .any(|r| r.reference_id.as_deref() == Some(reference) && Some(r.id) != own_id);
            if taken {
                return Err(StoreError::constraint(
                    REFERENCE_ID_CONSTRAINT,
                    format!("reference id {} already exists", reference),
                ));
            }
        }

        Ok(())
    }

    fn update_runner(&mut self, runner: &Runner) -> StoreResult<Runner> {
        let Some(existing) = self.runners.get(&runner.id) else {
            return Err(StoreError::not_found("runner", runner.id));
        };
        if !self.workflows.contains_key(&runner.workflow_id) {
            return Err(StoreError::constraint(
                RUNNER_WORKFLOW_FK,
                format!("workflow {} does not exist", runner.workflow_id),
            ));
        }
        self.check_references(
            runner.predecessor_runner_id,
            runner.reference_id.as_deref(),
            Some(runner.id),
        )?;

        let audit = AuditLog {
            created_on: existing.audit.created_on,
            created_by: existing.audit.created_by,
            updated_on: Utc::now(),
            updated_by: runner.audit.updated_by,
        };
        // A terminal runner is never reopened
        let reopens = existing.status.is_terminal() && !runner.status.is_terminal();
        let stored = if reopens {
            Runner {
                status: existing.status.clone(),
                message: existing.message.clone(),
                finished_on: existing.finished_on,
                audit,
                ..runner.clone()
            }
        } else {
            Runner {
                message: truncate_message(&runner.message),
                audit,
                ..runner.clone()
            }
        };
        self.runners.insert(stored.id, stored.clone());

        Ok(stored)
    }

    fn fail_runners(&mut self, ids: &[i64], message: &str, actor: i32) -> u64 {
        let now = Utc::now();
        let message = truncate_message(message);
        let mut changed = 0;

        for id in ids {
            if let Some(runner) = self.runners.get_mut(id) {
                runner.status = RunnerStatus::Failed;
                runner.finished_on = Some(now);
                runner.message = message.clone();
                runner.audit.updated_on = now;
                runner.audit.updated_by = actor;
                changed += 1;
            }
        }

        changed
    }

    fn set_workflow_status(&mut self, ids: &[i64], status: WorkflowStatus, actor: i32) -> u64 {
        let mut changed = 0;
        for id in ids {
            if let Some(wf) = self.workflows.get_mut(id) {
                wf.status = status;
                wf.audit.touch(actor);
                changed += 1;
            }
        }
        changed
    }

    fn pipeline_of(&self, runner: &Runner) -> Option<i64> {
        self.workflows.get(&runner.workflow_id).map(|wf| wf.pipeline_id)
    }

    /// Runners of a pipeline in ascending id order
    fn runners_of(&self, pipeline_id: i64) -> impl Iterator<Item = &Runner> {
        self.runners
            .values()
            .filter(move |r| self.pipeline_of(r) == Some(pipeline_id))
    }

    fn previous_queued(&self, pipeline_id: i64, before_runner_id: i64) -> Vec<Runner> {
        self.runners_of(pipeline_id)
            .filter(|r| {
                r.stage_type == StageType::Deploy
                    && r.id < before_runner_id
                    && r.status == RunnerStatus::Queued
            })
            .cloned()
            .collect()
    }

    fn create_trigger(&mut self, trigger: NewTrigger) -> StoreResult<CreatedTrigger> {
        let pipeline_id = trigger.pipeline_id();
        if !self.pipelines.contains_key(&pipeline_id) {
            return Err(StoreError::constraint(
                WORKFLOW_PIPELINE_FK,
                format!("pipeline {} does not exist", pipeline_id),
            ));
        }

        let workflow = match &trigger.target {
            TriggerTarget::NewWorkflow(wf) => self.insert_workflow(wf)?,
            TriggerTarget::Existing { workflow_id, .. } => self
                .workflows
                .get(workflow_id)
                .filter(|wf| wf.pipeline_id == pipeline_id)
                .cloned()
                .ok_or_else(|| {
                    StoreError::constraint(
                        RUNNER_WORKFLOW_FK,
                        format!(
                            "workflow {} does not exist in pipeline {}",
                            workflow_id, pipeline_id
                        ),
                    )
                })?,
        };

        let runner = self.insert_runner(&NewRunner {
            workflow_id: workflow.id,
            ..trigger.runner
        })?;

        let mut superseded = Vec::new();
        if runner.stage_type == StageType::Deploy {
            let stale = self.previous_queued(pipeline_id, runner.id);
            superseded = stale.iter().map(|r| r.id).collect();
            self.fail_runners(&superseded, SUPERSEDED_MESSAGE, runner.triggered_by);

            let mut stale_workflows: Vec<i64> = stale
                .iter()
                .map(|r| r.workflow_id)
                .filter(|id| *id != workflow.id)
                .collect();
            stale_workflows.sort_unstable();
            stale_workflows.dedup();
            self.set_workflow_status(
                &stale_workflows,
                WorkflowStatus::DroppedStale,
                runner.triggered_by,
            );
        }

        Ok(CreatedTrigger {
            workflow,
            runner,
            superseded,
        })
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn create_workflow(&self, wf: NewWorkflow) -> StoreResult<Workflow> {
        self.state.lock().await.insert_workflow(&wf)
    }

    async fn create_runner(&self, runner: NewRunner) -> StoreResult<Runner> {
        self.state.lock().await.insert_runner(&runner)
    }

    async fn create_runners(&self, runners: Vec<NewRunner>) -> StoreResult<Vec<Runner>> {
        let mut state = self.state.lock().await;
        let mut staged = state.clone();

        let created = runners
            .iter()
            .map(|r| staged.insert_runner(r))
            .collect::<StoreResult<Vec<_>>>()?;

        *state = staged;
        Ok(created)
    }

    async fn update_runner(&self, runner: &Runner) -> StoreResult<Runner> {
        self.state.lock().await.update_runner(runner)
    }

    async fn update_runners(&self, runners: &[Runner]) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let mut staged = state.clone();

        for runner in runners {
            staged.update_runner(runner)?;
        }

        *state = staged;
        Ok(())
    }

    async fn mark_runners_failed(
        &self,
        ids: &[i64],
        message: &str,
        actor: i32,
    ) -> StoreResult<u64> {
        Ok(self.state.lock().await.fail_runners(ids, message, actor))
    }

    async fn update_workflow_status(
        &self,
        id: i64,
        status: WorkflowStatus,
        actor: i32,
    ) -> StoreResult<()> {
        let changed = self.state.lock().await.set_workflow_status(&[id], status, actor);
        if changed == 0 {
            return Err(StoreError::not_found("workflow", id));
        }
        Ok(())
    }

    async fn create_trigger(&self, trigger: NewTrigger) -> StoreResult<CreatedTrigger> {
        let mut state = self.state.lock().await;
        let mut staged = state.clone();

        let created = staged.create_trigger(trigger)?;

        *state = staged;
        Ok(created)
    }

    async fn find_workflow(&self, id: i64) -> StoreResult<Option<Workflow>> {
        Ok(self.state.lock().await.workflows.get(&id).cloned())
    }

    async fn find_runner(&self, id: i64) -> StoreResult<Option<Runner>> {
        Ok(self.state.lock().await.runners.get(&id).cloned())
    }

    async fn find_runner_by_reference_id(&self, reference_id: &str) -> StoreResult<Option<Runner>> {
        let state = self.state.lock().await;
        Ok(state
            .runners
            .values()
            .find(|r| r.reference_id.as_deref() == Some(reference_id))
            .cloned())
    }

    async fn find_pipeline(&self, id: i64) -> StoreResult<Option<Pipeline>> {
        Ok(self.state.lock().await.pipelines.get(&id).cloned())
    }

    async fn find_config_by_pipeline(
        &self,
        pipeline_id: i64,
    ) -> StoreResult<Option<ExecutionConfig>> {
        Ok(self.state.lock().await.configs.get(&pipeline_id).cloned())
    }

    async fn find_latest_runner(
        &self,
        pipeline_id: i64,
        stage: StageType,
    ) -> StoreResult<Option<Runner>> {
        let state = self.state.lock().await;
        Ok(state
            .runners_of(pipeline_id)
            .filter(|r| r.stage_type == stage)
            .last()
            .cloned())
    }

    async fn list_runners_by_pipeline(
        &self,
        pipeline_id: i64,
        offset: i64,
        limit: i64,
    ) -> StoreResult<Vec<Runner>> {
        let state = self.state.lock().await;
        let mut runners: Vec<Runner> = state.runners_of(pipeline_id).cloned().collect();
        runners.reverse();

        Ok(runners
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_pipelines_triggered_since(&self, since: DateTime<Utc>) -> StoreResult<i64> {
        let state = self.state.lock().await;
        let mut pipelines: Vec<i64> = state
            .runners
            .values()
            .filter(|r| r.stage_type == StageType::Deploy)
            .filter(|r| r.started_on.is_some_and(|t| t > since))
            .filter_map(|r| state.pipeline_of(r))
            .collect();
        pipelines.sort_unstable();
        pipelines.dedup();

        Ok(pipelines.len() as i64)
    }

    async fn is_latest_workflow(&self, pipeline_id: i64, workflow_id: i64) -> StoreResult<bool> {
        let state = self.state.lock().await;
        Ok(!state
            .workflows
            .values()
            .any(|wf| wf.pipeline_id == pipeline_id && wf.id > workflow_id))
    }

    async fn is_latest_runner(&self, pipeline_id: i64, runner_id: i64) -> StoreResult<bool> {
        let state = self.state.lock().await;
        Ok(!state
            .runners_of(pipeline_id)
            .any(|r| r.stage_type == StageType::Deploy && r.id > runner_id))
    }

    async fn previous_queued_runners(
        &self,
        pipeline_id: i64,
        before_runner_id: i64,
    ) -> StoreResult<Vec<Runner>> {
        Ok(self.state.lock().await.previous_queued(pipeline_id, before_runner_id))
    }

    async fn retry_count(&self, runner_id: i64) -> StoreResult<i64> {
        let state = self.state.lock().await;
        Ok(state
            .runners
            .values()
            .filter(|r| r.predecessor_runner_id == Some(runner_id))
            .count() as i64)
    }

    async fn reference_id_exists(&self, reference_id: &str) -> StoreResult<bool> {
        let state = self.state.lock().await;
        Ok(state
            .runners
            .values()
            .any(|r| r.reference_id.as_deref() == Some(reference_id)))
    }

    async fn stuck_runners(
        &self,
        app_types: &[DeploymentAppType],
        started_after: DateTime<Utc>,
    ) -> StoreResult<Vec<RepollCandidate>> {
        let state = self.state.lock().await;
        let mut candidates = Vec::new();

        for pipeline in state.pipelines.values() {
            if pipeline.deleted || !app_types.contains(&pipeline.deployment_app_type) {
                continue;
            }

            let latest = state
                .runners_of(pipeline.id)
                .filter(|r| r.stage_type == StageType::Deploy && r.status != RunnerStatus::Queued)
                .max_by_key(|r| (r.workflow_id, r.id));

            let Some(runner) = latest else {
                continue;
            };

            let stuck = !runner.status.is_terminal()
                && !runner.status.is_pending()
                && runner.started_on.is_some_and(|t| t > started_after);

            if stuck {
                candidates.push(RepollCandidate {
                    pipeline_id: pipeline.id,
                    app_id: pipeline.app_id,
                    environment_id: pipeline.environment_id,
                    deployment_app_name: pipeline.deployment_app_name.clone(),
                    runner: runner.clone(),
                });
            }
        }

        candidates.sort_by(|a, b| b.runner.id.cmp(&a.runner.id));
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn repo_with_pipeline(
        id: i64,
        app_type: DeploymentAppType,
    ) -> InMemoryWorkflowRepository {
        let repo = InMemoryWorkflowRepository::new();
        repo.insert_pipeline(pipeline(id, app_type)).await;
        repo
    }

    fn pipeline(id: i64, app_type: DeploymentAppType) -> Pipeline {
        Pipeline {
            id,
            app_id: id * 10,
            environment_id: 1,
            deleted: false,
            run_pre_stage_in_env: false,
            run_post_stage_in_env: false,
            deployment_app_name: format!("app-{}", id),
            deployment_app_type: app_type,
        }
    }

    fn new_workflow(pipeline_id: i64) -> NewWorkflow {
        NewWorkflow {
            artifact_id: 1,
            pipeline_id,
            status: WorkflowStatus::Enqueued,
            created_by: 1,
        }
    }

    fn deploy_trigger(pipeline_id: i64) -> NewTrigger {
        NewTrigger {
            target: TriggerTarget::NewWorkflow(new_workflow(pipeline_id)),
            runner: NewRunner::queued(0, "deploy", StageType::Deploy, 1),
        }
    }

    #[tokio::test]
    async fn test_create_runner_with_missing_workflow_fails() {
        let repo = repo_with_pipeline(1, DeploymentAppType::Helm).await;

        let err = repo
            .create_runner(NewRunner::queued(99, "pre", StageType::Pre, 1))
            .await
            .unwrap_err();

        assert!(err.violates(RUNNER_WORKFLOW_FK));
    }

    #[tokio::test]
    async fn test_create_workflow_with_missing_pipeline_fails() {
        let repo = InMemoryWorkflowRepository::new();
        let err = repo.create_workflow(new_workflow(5)).await.unwrap_err();
        assert!(err.violates(WORKFLOW_PIPELINE_FK));
    }

    #[tokio::test]
    async fn test_create_runners_is_all_or_nothing() {
        let repo = repo_with_pipeline(1, DeploymentAppType::Helm).await;
        let wf = repo.create_workflow(new_workflow(1)).await.unwrap();

        let result = repo
            .create_runners(vec![
                NewRunner::queued(wf.id, "pre", StageType::Pre, 1),
                NewRunner::queued(wf.id + 1, "deploy", StageType::Deploy, 1),
            ])
            .await;

        assert!(result.is_err());
        assert!(repo.list_runners_by_pipeline(1, 0, 10).await.unwrap().is_empty());

        let created = repo
            .create_runners(vec![
                NewRunner::queued(wf.id, "pre", StageType::Pre, 1),
                NewRunner::queued(wf.id, "deploy", StageType::Deploy, 1),
            ])
            .await
            .unwrap();
        assert_eq!(created.len(), 2);
        assert!(created[0].id < created[1].id);
    }

    #[tokio::test]
    async fn test_update_runner_truncates_message() {
        let repo = repo_with_pipeline(1, DeploymentAppType::Helm).await;
        let mut runner = repo.create_trigger(deploy_trigger(1)).await.unwrap().runner;

        let message = "m".repeat(5000);
        runner.message = message.clone();
        repo.update_runner(&runner).await.unwrap();

        let stored = repo.find_runner(runner.id).await.unwrap().unwrap();
        assert_eq!(stored.message, message[..1000]);
    }

    #[tokio::test]
    async fn test_update_missing_runner_is_not_found() {
        let repo = repo_with_pipeline(1, DeploymentAppType::Helm).await;
        let mut runner = repo.create_trigger(deploy_trigger(1)).await.unwrap().runner;
        runner.id = 404;

        let err = repo.update_runner(&runner).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_runners_rolls_back_on_missing_id() {
        let repo = repo_with_pipeline(1, DeploymentAppType::Helm).await;
        let mut runner = repo.create_trigger(deploy_trigger(1)).await.unwrap().runner;

        runner.status = RunnerStatus::Progressing;
        let mut ghost = runner.clone();
        ghost.id = 999;

        let err = repo.update_runners(&[runner.clone(), ghost]).await.unwrap_err();
        assert!(err.is_not_found());

        let stored = repo.find_runner(runner.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunnerStatus::Queued);
        repo.update_runners(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn test_mark_runners_failed() {
        let repo = repo_with_pipeline(1, DeploymentAppType::Helm).await;
        let pre = repo
            .create_trigger(NewTrigger {
                target: TriggerTarget::NewWorkflow(new_workflow(1)),
                runner: NewRunner::queued(0, "pre", StageType::Pre, 1),
            })
            .await
            .unwrap();

        assert_eq!(repo.mark_runners_failed(&[], "unused", 3).await.unwrap(), 0);

        let changed = repo
            .mark_runners_failed(&[pre.runner.id], "pipeline deleted", 3)
            .await
            .unwrap();
        assert_eq!(changed, 1);

        let stored = repo.find_runner(pre.runner.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunnerStatus::Failed);
        assert_eq!(stored.message, "pipeline deleted");
        assert_eq!(stored.audit.updated_by, 3);
        assert!(stored.finished_on.is_some());
    }

    #[tokio::test]
    async fn test_new_deploy_trigger_drains_queue() {
        let repo = repo_with_pipeline(1, DeploymentAppType::Helm).await;
        let wf = repo.create_workflow(new_workflow(1)).await.unwrap();
        let queued = repo
            .create_runners(vec![
                NewRunner::queued(wf.id, "deploy", StageType::Deploy, 1),
                NewRunner::queued(wf.id, "deploy", StageType::Deploy, 1),
            ])
            .await
            .unwrap();
        let queued_ids: Vec<i64> = queued.iter().map(|r| r.id).collect();

        let third = repo.create_trigger(deploy_trigger(1)).await.unwrap();
        assert_eq!(third.superseded, queued_ids);

        for id in queued_ids {
            let drained = repo.find_runner(id).await.unwrap().unwrap();
            assert_eq!(drained.status, RunnerStatus::Failed);
            assert_eq!(drained.message, SUPERSEDED_MESSAGE);
            assert!(drained.finished_on.is_some());
        }

        let newest = repo.find_runner(third.runner.id).await.unwrap().unwrap();
        assert_eq!(newest.status, RunnerStatus::Queued);

        let stale_wf = repo.find_workflow(wf.id).await.unwrap().unwrap();
        assert_eq!(stale_wf.status, WorkflowStatus::DroppedStale);
    }

    #[tokio::test]
    async fn test_update_does_not_reopen_drained_runner() {
        let repo = repo_with_pipeline(1, DeploymentAppType::Helm).await;
        let first = repo.create_trigger(deploy_trigger(1)).await.unwrap();
        repo.create_trigger(deploy_trigger(1)).await.unwrap();

        // Written from a copy read before the drain
        let mut stale = first.runner;
        stale.status = RunnerStatus::Progressing;
        stale.message = "rolling out".to_string();
        stale.pod_status = Some("Running".to_string());
        let stored = repo.update_runner(&stale).await.unwrap();

        assert_eq!(stored.status, RunnerStatus::Failed);
        assert_eq!(stored.message, SUPERSEDED_MESSAGE);
        assert!(stored.finished_on.is_some());
        assert_eq!(stored.pod_status.as_deref(), Some("Running"));

        let mut later = stored.clone();
        later.status = RunnerStatus::Aborted;
        later.message = "cancelled".to_string();
        let stored = repo.update_runner(&later).await.unwrap();
        assert_eq!(stored.status, RunnerStatus::Aborted);
        assert_eq!(stored.message, "cancelled");
    }

    #[tokio::test]
    async fn test_existing_workflow_must_belong_to_pipeline() {
        let repo = repo_with_pipeline(1, DeploymentAppType::Helm).await;
        repo.insert_pipeline(pipeline(2, DeploymentAppType::Helm)).await;
        let other = repo.create_trigger(deploy_trigger(2)).await.unwrap();

        let err = repo
            .create_trigger(NewTrigger {
                target: TriggerTarget::Existing {
                    workflow_id: other.workflow.id,
                    pipeline_id: 1,
                },
                runner: NewRunner::queued(0, "deploy", StageType::Deploy, 1),
            })
            .await
            .unwrap_err();
        assert!(err.violates(RUNNER_WORKFLOW_FK));

        let untouched = repo.find_runner(other.runner.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, RunnerStatus::Queued);
        assert!(repo.list_runners_by_pipeline(1, 0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pre_stage_trigger_does_not_drain() {
        let repo = repo_with_pipeline(1, DeploymentAppType::Helm).await;
        let deploy = repo.create_trigger(deploy_trigger(1)).await.unwrap();

        let pre = repo
            .create_trigger(NewTrigger {
                target: TriggerTarget::NewWorkflow(new_workflow(1)),
                runner: NewRunner::queued(0, "pre", StageType::Pre, 1),
            })
            .await
            .unwrap();

        assert!(pre.superseded.is_empty());
        let untouched = repo.find_runner(deploy.runner.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, RunnerStatus::Queued);
    }

    #[tokio::test]
    async fn test_failed_trigger_leaves_no_rows() {
        let repo = repo_with_pipeline(1, DeploymentAppType::Helm).await;
        let mut trigger = deploy_trigger(1);
        trigger.runner.predecessor_runner_id = Some(77);

        let err = repo.create_trigger(trigger).await.unwrap_err();
        assert!(err.violates(RUNNER_PREDECESSOR_FK));
        assert!(repo.find_workflow(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_latest_resolution() {
        let repo = repo_with_pipeline(1, DeploymentAppType::Helm).await;
        repo.insert_pipeline(pipeline(2, DeploymentAppType::Helm)).await;

        let a = repo.create_trigger(deploy_trigger(1)).await.unwrap();
        let other = repo.create_trigger(deploy_trigger(2)).await.unwrap();

        assert!(repo.is_latest_workflow(1, a.workflow.id).await.unwrap());
        assert!(repo.is_latest_runner(1, a.runner.id).await.unwrap());
        assert!(repo.is_latest_workflow(2, other.workflow.id).await.unwrap());

        let b = repo.create_trigger(deploy_trigger(1)).await.unwrap();
        assert!(!repo.is_latest_workflow(1, a.workflow.id).await.unwrap());
        assert!(!repo.is_latest_runner(1, a.runner.id).await.unwrap());
        assert!(repo.is_latest_runner(1, b.runner.id).await.unwrap());
        assert!(repo.is_latest_runner(2, other.runner.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_retry_count_and_reference_lookup() {
        let repo = repo_with_pipeline(1, DeploymentAppType::Helm).await;
        let original = repo.create_trigger(deploy_trigger(1)).await.unwrap();
        assert_eq!(repo.retry_count(original.runner.id).await.unwrap(), 0);

        for attempt in 0..2 {
            let mut retry = NewRunner::queued(original.workflow.id, "deploy", StageType::Deploy, 1);
            retry.predecessor_runner_id = Some(original.runner.id);
            retry.reference_id = Some(format!("retry-{}", attempt));
            repo.create_runner(retry).await.unwrap();
        }

        assert_eq!(repo.retry_count(original.runner.id).await.unwrap(), 2);
        assert!(repo.reference_id_exists("retry-1").await.unwrap());
        assert!(!repo.reference_id_exists("retry-9").await.unwrap());

        let found = repo.find_runner_by_reference_id("retry-0").await.unwrap().unwrap();
        assert_eq!(found.predecessor_runner_id, Some(original.runner.id));
    }

    #[tokio::test]
    async fn test_sweep_scenario() {
        let repo = repo_with_pipeline(1, DeploymentAppType::Helm).await;
        repo.insert_pipeline(pipeline(2, DeploymentAppType::Helm)).await;
        let now = Utc::now();

        // Pipeline 1: an old succeeded deploy, then one progressing for two hours
        let old = repo.create_trigger(deploy_trigger(1)).await.unwrap();
        let mut old_runner = old.runner;
        old_runner.status = RunnerStatus::Succeeded;
        old_runner.started_on = Some(now - Duration::days(3));
        repo.update_runner(&old_runner).await.unwrap();

        let current = repo.create_trigger(deploy_trigger(1)).await.unwrap();
        let mut current_runner = current.runner;
        current_runner.status = RunnerStatus::Progressing;
        current_runner.started_on = Some(now - Duration::hours(2));
        repo.update_runner(&current_runner).await.unwrap();

        // Pipeline 2: only a queued deploy
        repo.create_trigger(deploy_trigger(2)).await.unwrap();

        let stuck = repo
            .stuck_runners(&DeploymentAppType::poll_based(), now - Duration::hours(24))
            .await
            .unwrap();

        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].pipeline_id, 1);
        assert_eq!(stuck[0].runner.id, current_runner.id);
        assert_eq!(stuck[0].deployment_app_name, "app-1");
    }

    #[tokio::test]
    async fn test_sweep_skips_push_based_deleted_and_ancient() {
        let repo = repo_with_pipeline(1, DeploymentAppType::ArgoCd).await;
        let mut deleted = pipeline(2, DeploymentAppType::Helm);
        deleted.deleted = true;
        repo.insert_pipeline(deleted).await;
        repo.insert_pipeline(pipeline(3, DeploymentAppType::Helm)).await;
        let now = Utc::now();

        for (pipeline_id, started) in [(1, now), (2, now), (3, now - Duration::hours(30))] {
            let mut runner = repo.create_trigger(deploy_trigger(pipeline_id)).await.unwrap().runner;
            runner.status = RunnerStatus::Progressing;
            runner.started_on = Some(started - Duration::minutes(5));
            repo.update_runner(&runner).await.unwrap();
        }

        let stuck = repo
            .stuck_runners(&DeploymentAppType::poll_based(), now - Duration::hours(24))
            .await
            .unwrap();
        assert!(stuck.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_ignores_queued_newer_trigger() {
        let repo = repo_with_pipeline(1, DeploymentAppType::Helm).await;
        let now = Utc::now();

        let mut running = repo.create_trigger(deploy_trigger(1)).await.unwrap().runner;
        running.status = RunnerStatus::UnableToFetch;
        running.started_on = Some(now - Duration::hours(1));
        repo.update_runner(&running).await.unwrap();

        // A newer queued trigger does not hide the in-flight runner
        repo.create_trigger(deploy_trigger(1)).await.unwrap();

        let stuck = repo
            .stuck_runners(&DeploymentAppType::poll_based(), now - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].runner.id, running.id);
    }

    #[tokio::test]
    async fn test_history_and_latest_reads() {
        let repo = repo_with_pipeline(1, DeploymentAppType::Helm).await;
        let first = repo.create_trigger(deploy_trigger(1)).await.unwrap();
        let second = repo.create_trigger(deploy_trigger(1)).await.unwrap();

        let page = repo.list_runners_by_pipeline(1, 0, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, second.runner.id);

        let next = repo.list_runners_by_pipeline(1, 1, 10).await.unwrap();
        assert_eq!(next[0].id, first.runner.id);

        let latest = repo.find_latest_runner(1, StageType::Deploy).await.unwrap().unwrap();
        assert_eq!(latest.id, second.runner.id);
        assert!(repo.find_latest_runner(1, StageType::Post).await.unwrap().is_none());
    }
}
