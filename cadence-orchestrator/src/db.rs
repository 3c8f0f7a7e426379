use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(
    database_url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Pipeline reference data (owned by the pipeline configuration service)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline (
            id BIGSERIAL PRIMARY KEY,
            app_id BIGINT NOT NULL,
            environment_id BIGINT NOT NULL,
            deleted BOOLEAN NOT NULL DEFAULT FALSE,
            run_pre_stage_in_env BOOLEAN NOT NULL DEFAULT FALSE,
            run_post_stage_in_env BOOLEAN NOT NULL DEFAULT FALSE,
            deployment_app_name VARCHAR(255) NOT NULL,
            deployment_app_type VARCHAR(50) NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workflow (
            id BIGSERIAL PRIMARY KEY,
            artifact_id BIGINT NOT NULL,
            pipeline_id BIGINT NOT NULL,
            workflow_status SMALLINT NOT NULL DEFAULT 0,
            created_on TIMESTAMPTZ NOT NULL,
            created_by INTEGER NOT NULL,
            updated_on TIMESTAMPTZ NOT NULL,
            updated_by INTEGER NOT NULL,
            CONSTRAINT workflow_pipeline_id_fkey
                FOREIGN KEY (pipeline_id) REFERENCES pipeline(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS runner (
            id BIGSERIAL PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            stage_type VARCHAR(20) NOT NULL,
            executor_kind VARCHAR(20) NOT NULL,
            status VARCHAR(50) NOT NULL,
            pod_status VARCHAR(50),
            message TEXT NOT NULL DEFAULT '',
            started_on TIMESTAMPTZ,
            finished_on TIMESTAMPTZ,
            namespace VARCHAR(255),
            log_location TEXT,
            pod_name VARCHAR(255),
            triggered_by INTEGER NOT NULL,
            workflow_id BIGINT NOT NULL,
            blob_storage_enabled BOOLEAN NOT NULL DEFAULT FALSE,
            reservation_ids BIGINT[] NOT NULL DEFAULT '{}',
            reference_id VARCHAR(255),
            predecessor_runner_id BIGINT,
            created_on TIMESTAMPTZ NOT NULL,
            created_by INTEGER NOT NULL,
            updated_on TIMESTAMPTZ NOT NULL,
            updated_by INTEGER NOT NULL,
            CONSTRAINT runner_workflow_id_fkey
                FOREIGN KEY (workflow_id) REFERENCES workflow(id),
            CONSTRAINT runner_reference_id_key UNIQUE (reference_id),
            CONSTRAINT runner_predecessor_runner_id_fkey
                FOREIGN KEY (predecessor_runner_id) REFERENCES runner(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS execution_config (
            id BIGSERIAL PRIMARY KEY,
            pipeline_id BIGINT NOT NULL UNIQUE REFERENCES pipeline(id),
            timeout_seconds BIGINT,
            min_cpu VARCHAR(50),
            max_cpu VARCHAR(50),
            min_memory VARCHAR(50),
            max_memory VARCHAR(50),
            min_storage VARCHAR(50),
            max_storage VARCHAR(50),
            min_ephemeral_storage VARCHAR(50),
            max_ephemeral_storage VARCHAR(50),
            cache_bucket VARCHAR(255),
            cache_region VARCHAR(100),
            image TEXT,
            namespace VARCHAR(255),
            logs_bucket VARCHAR(255),
            artifact_location_format TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Latest-workflow and latest-runner resolution
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_workflow_pipeline_id ON workflow(pipeline_id, id DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_runner_workflow_stage \
         ON runner(workflow_id, stage_type, id DESC)",
    )
    .execute(pool)
    .await?;

    // Retry counting
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_runner_predecessor ON runner(predecessor_runner_id)",
    )
    .execute(pool)
    .await?;

    // Reconciliation sweep
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_runner_stage_started_on ON runner(stage_type, started_on)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
