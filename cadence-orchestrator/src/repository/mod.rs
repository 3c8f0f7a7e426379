//! Repository Module
//!
//! Data access layer for the orchestrator. [`WorkflowRepository`] is the
//! store interface; [`PgWorkflowRepository`] backs it with Postgres and
//! [`InMemoryWorkflowRepository`] keeps everything in process memory with the
//! same semantics.

mod memory;
mod postgres;

use async_trait::async_trait;
use cadence_core::domain::pipeline::{DeploymentAppType, ExecutionConfig, Pipeline};
use cadence_core::domain::runner::{Runner, StageType};
use cadence_core::domain::workflow::{Workflow, WorkflowStatus};
use cadence_core::dto::reconcile::RepollCandidate;
use cadence_core::dto::trigger::{NewRunner, NewTrigger, NewWorkflow};
use chrono::{DateTime, Utc};

use crate::error::StoreResult;

pub use memory::InMemoryWorkflowRepository;
pub use postgres::PgWorkflowRepository;

/// Unique constraint on `runner.reference_id`
pub const REFERENCE_ID_CONSTRAINT: &str = "runner_reference_id_key";
/// Foreign key `runner.workflow_id -> workflow.id`
pub const RUNNER_WORKFLOW_FK: &str = "runner_workflow_id_fkey";
/// Foreign key `runner.predecessor_runner_id -> runner.id`
pub const RUNNER_PREDECESSOR_FK: &str = "runner_predecessor_runner_id_fkey";
/// Foreign key `workflow.pipeline_id -> pipeline.id`
pub const WORKFLOW_PIPELINE_FK: &str = "workflow_pipeline_id_fkey";

/// Rows written by one trigger transaction
#[derive(Debug, Clone)]
pub struct CreatedTrigger {
    pub workflow: Workflow,
    pub runner: Runner,
    /// Queued deploy runners failed by this trigger
    pub superseded: Vec<i64>,
}

/// Durable storage for workflows and runners
///
/// Implementations perform no retries; transient failures surface as
/// [`crate::error::StoreError::Transient`].
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    async fn create_workflow(&self, wf: NewWorkflow) -> StoreResult<Workflow>;

    async fn create_runner(&self, runner: NewRunner) -> StoreResult<Runner>;

    /// Insert several runners atomically
    async fn create_runners(&self, runners: Vec<NewRunner>) -> StoreResult<Vec<Runner>>;

    /// Full update keyed by id. The message is truncated before persisting.
    async fn update_runner(&self, runner: &Runner) -> StoreResult<Runner>;

    /// Full update of a batch, all or nothing
    async fn update_runners(&self, runners: &[Runner]) -> StoreResult<()>;

    /// Fail every listed runner in one statement, returning how many changed
    async fn mark_runners_failed(&self, ids: &[i64], message: &str, actor: i32) -> StoreResult<u64>;

    async fn update_workflow_status(
        &self,
        id: i64,
        status: WorkflowStatus,
        actor: i32,
    ) -> StoreResult<()>;

    /// Insert a trigger's workflow and runner and, for deploy runners, fail
    /// every older queued deploy runner of the pipeline, all in one transaction
    async fn create_trigger(&self, trigger: NewTrigger) -> StoreResult<CreatedTrigger>;

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    async fn find_workflow(&self, id: i64) -> StoreResult<Option<Workflow>>;

    async fn find_runner(&self, id: i64) -> StoreResult<Option<Runner>>;

    async fn find_runner_by_reference_id(&self, reference_id: &str) -> StoreResult<Option<Runner>>;

    async fn find_pipeline(&self, id: i64) -> StoreResult<Option<Pipeline>>;

    async fn find_config_by_pipeline(
        &self,
        pipeline_id: i64,
    ) -> StoreResult<Option<ExecutionConfig>>;

    /// Newest runner of a stage for a pipeline
    async fn find_latest_runner(
        &self,
        pipeline_id: i64,
        stage: StageType,
    ) -> StoreResult<Option<Runner>>;

    /// Runner history of a pipeline, newest first
    async fn list_runners_by_pipeline(
        &self,
        pipeline_id: i64,
        offset: i64,
        limit: i64,
    ) -> StoreResult<Vec<Runner>>;

    /// Distinct pipelines with a deploy runner started after `since`
    async fn count_pipelines_triggered_since(&self, since: DateTime<Utc>) -> StoreResult<i64>;

    // -------------------------------------------------------------------------
    // Supersede resolution
    // -------------------------------------------------------------------------

    /// No workflow with a greater id exists for the pipeline
    async fn is_latest_workflow(&self, pipeline_id: i64, workflow_id: i64) -> StoreResult<bool>;

    /// No deploy runner with a greater id exists for the pipeline
    async fn is_latest_runner(&self, pipeline_id: i64, runner_id: i64) -> StoreResult<bool>;

    // -------------------------------------------------------------------------
    // Queue, retries, reconciliation
    // -------------------------------------------------------------------------

    /// Queued deploy runners of the pipeline older than `before_runner_id`
    async fn previous_queued_runners(
        &self,
        pipeline_id: i64,
        before_runner_id: i64,
    ) -> StoreResult<Vec<Runner>>;

    /// Number of runners retrying `runner_id`
    async fn retry_count(&self, runner_id: i64) -> StoreResult<i64>;

    /// Whether a runner already carries `reference_id`
    async fn reference_id_exists(&self, reference_id: &str) -> StoreResult<bool>;

    /// Latest non-queued deploy runner per live pipeline of the given app
    /// types, kept when it is neither terminal nor pending and started after
    /// `started_after`
    async fn stuck_runners(
        &self,
        app_types: &[DeploymentAppType],
        started_after: DateTime<Utc>,
    ) -> StoreResult<Vec<RepollCandidate>>;
}
