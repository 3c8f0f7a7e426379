//! Postgres Workflow Repository
//!
//! Handles all database operations for workflows and runners. Cross-row
//! invariants are enforced inside transactions; nothing here locks in process.

use async_trait::async_trait;
use cadence_core::domain::AuditLog;
use cadence_core::domain::pipeline::{DeploymentAppType, ExecutionConfig, Pipeline};
use cadence_core::domain::runner::{
    ExecutorKind, Runner, StageType, SUPERSEDED_MESSAGE, truncate_message,
};
use cadence_core::domain::status::RunnerStatus;
use cadence_core::domain::workflow::{Workflow, WorkflowStatus};
use cadence_core::dto::reconcile::RepollCandidate;
use cadence_core::dto::trigger::{NewRunner, NewTrigger, NewWorkflow, TriggerTarget};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

use super::{
    CreatedTrigger, RUNNER_WORKFLOW_FK, WORKFLOW_PIPELINE_FK, WorkflowRepository,
};
use crate::error::{StoreError, StoreResult};

/// Postgres-backed [`WorkflowRepository`]
#[derive(Debug, Clone)]
pub struct PgWorkflowRepository {
    pool: PgPool,
}

impl PgWorkflowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Begin a transaction for use with the `*_tx` methods
    pub async fn begin(&self) -> StoreResult<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    /// Update a batch of runners inside a caller-supplied transaction
    ///
    /// Fails with `NotFound` on the first absent id; the caller decides
    /// whether to roll back.
    pub async fn bulk_update_runners_tx(
        &self,
        runners: &[Runner],
        tx: &mut Transaction<'_, Postgres>,
    ) -> StoreResult<()> {
        for runner in runners {
            update_runner_row(&mut **tx, runner).await?;
        }
        Ok(())
    }

    /// Fail runners inside a caller-supplied transaction
    pub async fn mark_runners_failed_tx(
        &self,
        ids: &[i64],
        message: &str,
        actor: i32,
        tx: &mut Transaction<'_, Postgres>,
    ) -> StoreResult<u64> {
        fail_runners(&mut **tx, ids, message, actor).await
    }
}

#[async_trait]
impl WorkflowRepository for PgWorkflowRepository {
    async fn create_workflow(&self, wf: NewWorkflow) -> StoreResult<Workflow> {
        let mut conn = self.pool.acquire().await?;
        insert_workflow(&mut conn, &wf).await
    }

    async fn create_runner(&self, runner: NewRunner) -> StoreResult<Runner> {
        let mut conn = self.pool.acquire().await?;
        insert_runner(&mut conn, &runner).await
    }

    async fn create_runners(&self, runners: Vec<NewRunner>) -> StoreResult<Vec<Runner>> {
        if runners.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(runners.len());
        for runner in &runners {
            created.push(insert_runner(&mut tx, runner).await?);
        }
        tx.commit().await?;

        Ok(created)
    }

    async fn update_runner(&self, runner: &Runner) -> StoreResult<Runner> {
        let mut conn = self.pool.acquire().await?;
        update_runner_row(&mut conn, runner).await
    }

    async fn update_runners(&self, runners: &[Runner]) -> StoreResult<()> {
        if runners.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        self.bulk_update_runners_tx(runners, &mut tx).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn mark_runners_failed(
        &self,
        ids: &[i64],
        message: &str,
        actor: i32,
    ) -> StoreResult<u64> {
        let mut conn = self.pool.acquire().await?;
        fail_runners(&mut conn, ids, message, actor).await
    }

    async fn update_workflow_status(
        &self,
        id: i64,
        status: WorkflowStatus,
        actor: i32,
    ) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await?;
        let updated = set_workflow_status(&mut conn, &[id], status, actor).await?;

        if updated == 0 {
            return Err(StoreError::not_found("workflow", id));
        }

        Ok(())
    }

    async fn create_trigger(&self, trigger: NewTrigger) -> StoreResult<CreatedTrigger> {
        let pipeline_id = trigger.pipeline_id();
        let mut tx = self.pool.begin().await?;

        // Serializes triggers per pipeline so id order matches commit order
        let locked: Option<i64> =
            sqlx::query_scalar("SELECT id FROM pipeline WHERE id = $1 FOR UPDATE")
                .bind(pipeline_id)
                .fetch_optional(&mut *tx)
                .await?;

        if locked.is_none() {
            return Err(StoreError::constraint(
                WORKFLOW_PIPELINE_FK,
                format!("pipeline {} does not exist", pipeline_id),
            ));
        }

        let workflow = match &trigger.target {
            TriggerTarget::NewWorkflow(wf) => insert_workflow(&mut tx, wf).await?,
            TriggerTarget::Existing { workflow_id, .. } => {
                let existing = select_workflow(&mut tx, *workflow_id).await?;
                existing
                    .filter(|wf| wf.pipeline_id == pipeline_id)
                    .ok_or_else(|| {
                        StoreError::constraint(
                            RUNNER_WORKFLOW_FK,
                            format!(
                                "workflow {} does not exist in pipeline {}",
                                workflow_id, pipeline_id
                            ),
                        )
                    })?
            }
        };

        let new_runner = NewRunner {
            workflow_id: workflow.id,
            ..trigger.runner
        };
        let runner = insert_runner(&mut tx, &new_runner).await?;

        let mut superseded = Vec::new();
        if runner.stage_type == StageType::Deploy {
            let stale = select_previous_queued(&mut tx, pipeline_id, runner.id, true).await?;
            superseded = stale.iter().map(|r| r.id).collect();

            fail_runners(&mut tx, &superseded, SUPERSEDED_MESSAGE, runner.triggered_by).await?;

            let mut stale_workflows: Vec<i64> = stale
                .iter()
                .map(|r| r.workflow_id)
                .filter(|id| *id != workflow.id)
                .collect();
            stale_workflows.sort_unstable();
            stale_workflows.dedup();

            set_workflow_status(
                &mut tx,
                &stale_workflows,
                WorkflowStatus::DroppedStale,
                runner.triggered_by,
            )
            .await?;
        }

        tx.commit().await?;

        Ok(CreatedTrigger {
            workflow,
            runner,
            superseded,
        })
    }

    async fn find_workflow(&self, id: i64) -> StoreResult<Option<Workflow>> {
        let mut conn = self.pool.acquire().await?;
        select_workflow(&mut conn, id).await
    }

    async fn find_runner(&self, id: i64) -> StoreResult<Option<Runner>> {
        let row = sqlx::query_as::<_, RunnerRow>("SELECT r.* FROM runner r WHERE r.id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Runner::try_from).transpose()
    }

    async fn find_runner_by_reference_id(&self, reference_id: &str) -> StoreResult<Option<Runner>> {
        let row =
            sqlx::query_as::<_, RunnerRow>("SELECT r.* FROM runner r WHERE r.reference_id = $1")
                .bind(reference_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Runner::try_from).transpose()
    }

    async fn find_pipeline(&self, id: i64) -> StoreResult<Option<Pipeline>> {
        let row = sqlx::query_as::<_, PipelineRow>(
            r#"
            SELECT id, app_id, environment_id, deleted, run_pre_stage_in_env,
                   run_post_stage_in_env, deployment_app_name, deployment_app_type
            FROM pipeline
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn find_config_by_pipeline(
        &self,
        pipeline_id: i64,
    ) -> StoreResult<Option<ExecutionConfig>> {
        let row = sqlx::query_as::<_, ExecutionConfigRow>(
            r#"
            SELECT id, pipeline_id, timeout_seconds, min_cpu, max_cpu, min_memory, max_memory,
                   min_storage, max_storage, min_ephemeral_storage, max_ephemeral_storage,
                   cache_bucket, cache_region, image, namespace, logs_bucket,
                   artifact_location_format
            FROM execution_config
            WHERE pipeline_id = $1
            "#,
        )
        .bind(pipeline_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn find_latest_runner(
        &self,
        pipeline_id: i64,
        stage: StageType,
    ) -> StoreResult<Option<Runner>> {
        let row = sqlx::query_as::<_, RunnerRow>(
            r#"
            SELECT r.*
            FROM runner r
            INNER JOIN workflow w ON w.id = r.workflow_id
            WHERE w.pipeline_id = $1 AND r.stage_type = $2
            ORDER BY r.id DESC
            LIMIT 1
            "#,
        )
        .bind(pipeline_id)
        .bind(stage.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Runner::try_from).transpose()
    }

    async fn list_runners_by_pipeline(
        &self,
        pipeline_id: i64,
        offset: i64,
        limit: i64,
    ) -> StoreResult<Vec<Runner>> {
        let rows = sqlx::query_as::<_, RunnerRow>(
            r#"
            SELECT r.*
            FROM runner r
            INNER JOIN workflow w ON w.id = r.workflow_id
            WHERE w.pipeline_id = $1
            ORDER BY r.id DESC
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(pipeline_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        into_runners(rows)
    }

    async fn count_pipelines_triggered_since(&self, since: DateTime<Utc>) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT w.pipeline_id)
            FROM workflow w
            INNER JOIN runner r ON r.workflow_id = w.id
            WHERE r.stage_type = $1 AND r.started_on > $2
            "#,
        )
        .bind(StageType::Deploy.as_str())
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn is_latest_workflow(&self, pipeline_id: i64, workflow_id: i64) -> StoreResult<bool> {
        let latest: bool = sqlx::query_scalar(
            "SELECT NOT EXISTS (SELECT 1 FROM workflow WHERE pipeline_id = $1 AND id > $2)",
        )
        .bind(pipeline_id)
        .bind(workflow_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(latest)
    }

    async fn is_latest_runner(&self, pipeline_id: i64, runner_id: i64) -> StoreResult<bool> {
        let latest: bool = sqlx::query_scalar(
            r#"
            SELECT NOT EXISTS (
                SELECT 1
                FROM runner r
                INNER JOIN workflow w ON w.id = r.workflow_id
                WHERE w.pipeline_id = $1 AND r.stage_type = $2 AND r.id > $3
            )
            "#,
        )
        .bind(pipeline_id)
        .bind(StageType::Deploy.as_str())
        .bind(runner_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(latest)
    }

    async fn previous_queued_runners(
        &self,
        pipeline_id: i64,
        before_runner_id: i64,
    ) -> StoreResult<Vec<Runner>> {
        let mut conn = self.pool.acquire().await?;
        select_previous_queued(&mut conn, pipeline_id, before_runner_id, false).await
    }

    async fn retry_count(&self, runner_id: i64) -> StoreResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(id) FROM runner WHERE predecessor_runner_id = $1")
                .bind(runner_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    async fn reference_id_exists(&self, reference_id: &str) -> StoreResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM runner WHERE reference_id = $1)")
                .bind(reference_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    async fn stuck_runners(
        &self,
        app_types: &[DeploymentAppType],
        started_after: DateTime<Utc>,
    ) -> StoreResult<Vec<RepollCandidate>> {
        if app_types.is_empty() {
            return Ok(Vec::new());
        }

        let app_types: Vec<String> = app_types.iter().map(|t| t.as_str().to_string()).collect();
        let excluded: Vec<String> = RunnerStatus::sweep_excluded()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let rows = sqlx::query_as::<_, RepollRow>(
            r#"
            SELECT latest.*
            FROM (
                SELECT DISTINCT ON (w.pipeline_id)
                       r.*, w.pipeline_id, p.app_id, p.environment_id, p.deployment_app_name
                FROM runner r
                INNER JOIN workflow w ON w.id = r.workflow_id
                INNER JOIN pipeline p ON p.id = w.pipeline_id
                WHERE r.stage_type = $1
                  AND r.status <> $2
                  AND p.deleted = FALSE
                  AND p.deployment_app_type = ANY($3)
                ORDER BY w.pipeline_id, w.id DESC, r.id DESC
            ) latest
            WHERE latest.status <> ALL($4)
              AND latest.started_on > $5
            ORDER BY latest.id DESC
            "#,
        )
        .bind(StageType::Deploy.as_str())
        .bind(RunnerStatus::Queued.as_str())
        .bind(&app_types)
        .bind(&excluded)
        .bind(started_after)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RepollCandidate::try_from).collect()
    }
}

// =============================================================================
// Statements shared by pooled and transactional paths
// =============================================================================

async fn insert_workflow(conn: &mut PgConnection, wf: &NewWorkflow) -> StoreResult<Workflow> {
    let now = Utc::now();

    let row = sqlx::query_as::<_, WorkflowRow>(
        r#"
        INSERT INTO workflow (artifact_id, pipeline_id, workflow_status,
                              created_on, created_by, updated_on, updated_by)
        VALUES ($1, $2, $3, $4, $5, $4, $5)
        RETURNING id, artifact_id, pipeline_id, workflow_status,
                  created_on, created_by, updated_on, updated_by
        "#,
    )
    .bind(wf.artifact_id)
    .bind(wf.pipeline_id)
    .bind(wf.status.code())
    .bind(now)
    .bind(wf.created_by)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.into())
}

async fn select_workflow(conn: &mut PgConnection, id: i64) -> StoreResult<Option<Workflow>> {
    let row = sqlx::query_as::<_, WorkflowRow>(
        r#"
        SELECT id, artifact_id, pipeline_id, workflow_status,
               created_on, created_by, updated_on, updated_by
        FROM workflow
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|r| r.into()))
}

async fn set_workflow_status(
    conn: &mut PgConnection,
    ids: &[i64],
    status: WorkflowStatus,
    actor: i32,
) -> StoreResult<u64> {
    if ids.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        r#"
        UPDATE workflow
        SET workflow_status = $1, updated_on = $2, updated_by = $3
        WHERE id = ANY($4)
        "#,
    )
    .bind(status.code())
    .bind(Utc::now())
    .bind(actor)
    .bind(ids)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

async fn insert_runner(conn: &mut PgConnection, runner: &NewRunner) -> StoreResult<Runner> {
    let now = Utc::now();

    let row = sqlx::query_as::<_, RunnerRow>(
        r#"
        INSERT INTO runner (
            name, stage_type, executor_kind, status, message, started_on,
            namespace, log_location, triggered_by, workflow_id, blob_storage_enabled,
            reservation_ids, reference_id, predecessor_runner_id,
            created_on, created_by, updated_on, updated_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $9, $15, $9)
        RETURNING *
        "#,
    )
    .bind(&runner.name)
    .bind(runner.stage_type.as_str())
    .bind(runner.executor_kind.as_str())
    .bind(runner.status.as_str())
    .bind(truncate_message(&runner.message))
    .bind(runner.started_on)
    .bind(&runner.namespace)
    .bind(&runner.log_location)
    .bind(runner.triggered_by)
    .bind(runner.workflow_id)
    .bind(runner.blob_storage_enabled)
    .bind(&runner.reservation_ids)
    .bind(&runner.reference_id)
    .bind(runner.predecessor_runner_id)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Runner::try_from(row)
}

/// Full update keyed by id
///
/// A terminal runner is never reopened: when the stored status is terminal and
/// the new one is not, status, message and finished_on keep their stored values.
async fn update_runner_row(conn: &mut PgConnection, runner: &Runner) -> StoreResult<Runner> {
    let row = sqlx::query_as::<_, RunnerRow>(
        r#"
        UPDATE runner
        SET name = $1, stage_type = $2, executor_kind = $3,
            status = CASE WHEN status = ANY($21) AND $4 <> ALL($21) THEN status ELSE $4 END,
            pod_status = $5,
            message = CASE WHEN status = ANY($21) AND $4 <> ALL($21) THEN message ELSE $6 END,
            started_on = $7,
            finished_on = CASE
                WHEN status = ANY($21) AND $4 <> ALL($21) THEN finished_on
                ELSE $8
            END,
            namespace = $9, log_location = $10, pod_name = $11, triggered_by = $12,
            workflow_id = $13, blob_storage_enabled = $14, reservation_ids = $15,
            reference_id = $16, predecessor_runner_id = $17, updated_on = $18, updated_by = $19
        WHERE id = $20
        RETURNING *
        "#,
    )
    .bind(&runner.name)
    .bind(runner.stage_type.as_str())
    .bind(runner.executor_kind.as_str())
    .bind(runner.status.as_str())
    .bind(&runner.pod_status)
    .bind(truncate_message(&runner.message))
    .bind(runner.started_on)
    .bind(runner.finished_on)
    .bind(&runner.namespace)
    .bind(&runner.log_location)
    .bind(&runner.pod_name)
    .bind(runner.triggered_by)
    .bind(runner.workflow_id)
    .bind(runner.blob_storage_enabled)
    .bind(&runner.reservation_ids)
    .bind(&runner.reference_id)
    .bind(runner.predecessor_runner_id)
    .bind(Utc::now())
    .bind(runner.audit.updated_by)
    .bind(runner.id)
    .bind(terminal_statuses())
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Runner::try_from(row),
        None => Err(StoreError::not_found("runner", runner.id)),
    }
}

async fn fail_runners(
    conn: &mut PgConnection,
    ids: &[i64],
    message: &str,
    actor: i32,
) -> StoreResult<u64> {
    if ids.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        r#"
        UPDATE runner
        SET status = $1, finished_on = $2, updated_on = $2, updated_by = $3, message = $4
        WHERE id = ANY($5)
        "#,
    )
    .bind(RunnerStatus::Failed.as_str())
    .bind(Utc::now())
    .bind(actor)
    .bind(truncate_message(message))
    .bind(ids)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

async fn select_previous_queued(
    conn: &mut PgConnection,
    pipeline_id: i64,
    before_runner_id: i64,
    for_update: bool,
) -> StoreResult<Vec<Runner>> {
    let sql = format!(
        r#"
        SELECT r.*
        FROM runner r
        INNER JOIN workflow w ON w.id = r.workflow_id
        WHERE w.pipeline_id = $1
          AND r.stage_type = $2
          AND r.id < $3
          AND r.status = $4
        ORDER BY r.id ASC
        {}
        "#,
        if for_update { "FOR UPDATE OF r" } else { "" }
    );

    let rows = sqlx::query_as::<_, RunnerRow>(&sql)
        .bind(pipeline_id)
        .bind(StageType::Deploy.as_str())
        .bind(before_runner_id)
        .bind(RunnerStatus::Queued.as_str())
        .fetch_all(&mut *conn)
        .await?;

    into_runners(rows)
}

fn terminal_statuses() -> Vec<String> {
    RunnerStatus::terminal()
        .iter()
        .map(|s| s.as_str().to_string())
        .collect()
}

fn into_runners(rows: Vec<RunnerRow>) -> StoreResult<Vec<Runner>> {
    rows.into_iter().map(Runner::try_from).collect()
}

fn decode_error(message: String) -> StoreError {
    StoreError::Database(sqlx::Error::Decode(message.into()))
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct WorkflowRow {
    id: i64,
    artifact_id: i64,
    pipeline_id: i64,
    workflow_status: i16,
    created_on: DateTime<Utc>,
    created_by: i32,
    updated_on: DateTime<Utc>,
    updated_by: i32,
}

impl From<WorkflowRow> for Workflow {
    fn from(row: WorkflowRow) -> Self {
        Workflow {
            id: row.id,
            artifact_id: row.artifact_id,
            pipeline_id: row.pipeline_id,
            status: WorkflowStatus::from_code(row.workflow_status),
            audit: AuditLog {
                created_on: row.created_on,
                created_by: row.created_by,
                updated_on: row.updated_on,
                updated_by: row.updated_by,
            },
        }
    }
}

#[derive(sqlx::FromRow)]
struct RunnerRow {
    id: i64,
    name: String,
    stage_type: String,
    executor_kind: String,
    status: String,
    pod_status: Option<String>,
    message: String,
    started_on: Option<DateTime<Utc>>,
    finished_on: Option<DateTime<Utc>>,
    namespace: Option<String>,
    log_location: Option<String>,
    pod_name: Option<String>,
    triggered_by: i32,
    workflow_id: i64,
    blob_storage_enabled: bool,
    reservation_ids: Vec<i64>,
    reference_id: Option<String>,
    predecessor_runner_id: Option<i64>,
    created_on: DateTime<Utc>,
    created_by: i32,
    updated_on: DateTime<Utc>,
    updated_by: i32,
}

impl TryFrom<RunnerRow> for Runner {
    type Error = StoreError;

    fn try_from(row: RunnerRow) -> Result<Self, Self::Error> {
        let stage_type = StageType::parse(&row.stage_type).ok_or_else(|| {
            decode_error(format!("runner {}: unknown stage type {}", row.id, row.stage_type))
        })?;
        let executor_kind = ExecutorKind::parse(&row.executor_kind).ok_or_else(|| {
            decode_error(format!(
                "runner {}: unknown executor kind {}",
                row.id, row.executor_kind
            ))
        })?;

        Ok(Runner {
            id: row.id,
            name: row.name,
            stage_type,
            executor_kind,
            status: RunnerStatus::parse(&row.status),
            pod_status: row.pod_status,
            message: row.message,
            started_on: row.started_on,
            finished_on: row.finished_on,
            namespace: row.namespace,
            log_location: row.log_location,
            pod_name: row.pod_name,
            triggered_by: row.triggered_by,
            workflow_id: row.workflow_id,
            blob_storage_enabled: row.blob_storage_enabled,
            reservation_ids: row.reservation_ids,
            reference_id: row.reference_id,
            predecessor_runner_id: row.predecessor_runner_id,
            audit: AuditLog {
                created_on: row.created_on,
                created_by: row.created_by,
                updated_on: row.updated_on,
                updated_by: row.updated_by,
            },
        })
    }
}

#[derive(sqlx::FromRow)]
struct RepollRow {
    #[sqlx(flatten)]
    runner: RunnerRow,
    pipeline_id: i64,
    app_id: i64,
    environment_id: i64,
    deployment_app_name: String,
}

impl TryFrom<RepollRow> for RepollCandidate {
    type Error = StoreError;

    fn try_from(row: RepollRow) -> Result<Self, Self::Error> {
        Ok(RepollCandidate {
            pipeline_id: row.pipeline_id,
            app_id: row.app_id,
            environment_id: row.environment_id,
            deployment_app_name: row.deployment_app_name,
            runner: Runner::try_from(row.runner)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PipelineRow {
    id: i64,
    app_id: i64,
    environment_id: i64,
    deleted: bool,
    run_pre_stage_in_env: bool,
    run_post_stage_in_env: bool,
    deployment_app_name: String,
    deployment_app_type: String,
}

impl From<PipelineRow> for Pipeline {
    fn from(row: PipelineRow) -> Self {
        Pipeline {
            id: row.id,
            app_id: row.app_id,
            environment_id: row.environment_id,
            deleted: row.deleted,
            run_pre_stage_in_env: row.run_pre_stage_in_env,
            run_post_stage_in_env: row.run_post_stage_in_env,
            deployment_app_name: row.deployment_app_name,
            deployment_app_type: DeploymentAppType::parse(&row.deployment_app_type),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ExecutionConfigRow {
    id: i64,
    pipeline_id: i64,
    timeout_seconds: Option<i64>,
    min_cpu: Option<String>,
    max_cpu: Option<String>,
    min_memory: Option<String>,
    max_memory: Option<String>,
    min_storage: Option<String>,
    max_storage: Option<String>,
    min_ephemeral_storage: Option<String>,
    max_ephemeral_storage: Option<String>,
    cache_bucket: Option<String>,
    cache_region: Option<String>,
    image: Option<String>,
    namespace: Option<String>,
    logs_bucket: Option<String>,
    artifact_location_format: Option<String>,
}

impl From<ExecutionConfigRow> for ExecutionConfig {
    fn from(row: ExecutionConfigRow) -> Self {
        ExecutionConfig {
            id: row.id,
            pipeline_id: row.pipeline_id,
            timeout_seconds: row.timeout_seconds,
            min_cpu: row.min_cpu,
            max_cpu: row.max_cpu,
            min_memory: row.min_memory,
            max_memory: row.max_memory,
            min_storage: row.min_storage,
            max_storage: row.max_storage,
            min_ephemeral_storage: row.min_ephemeral_storage,
            max_ephemeral_storage: row.max_ephemeral_storage,
            cache_bucket: row.cache_bucket,
            cache_region: row.cache_region,
            image: row.image,
            namespace: row.namespace,
            logs_bucket: row.logs_bucket,
            artifact_location_format: row.artifact_location_format,
        }
    }
}

// =============================================================================
// Tests (require a Postgres instance at DATABASE_URL)
// =============================================================================
