use anyhow::Context;
use async_trait::async_trait;
use cadence_core::dto::reconcile::RepollCandidate;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cadence_orchestrator::config::Config;
use cadence_orchestrator::db;
use cadence_orchestrator::repository::PgWorkflowRepository;
use cadence_orchestrator::service::{Reconciler, RepollHandler};

/// Re-poller that only reports what it would fetch
struct LoggingRepollHandler;

#[async_trait]
impl RepollHandler for LoggingRepollHandler {
    async fn repoll(&self, candidate: &RepollCandidate) -> anyhow::Result<()> {
        tracing::info!(
            "Runner {} of {} (app {}, env {}) is {} since {:?}",
            candidate.runner.id,
            candidate.deployment_app_name,
            candidate.app_id,
            candidate.environment_id,
            candidate.runner.status,
            candidate.runner.started_on
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadence_orchestrator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Cadence Orchestrator...");

    let config = Config::from_env()?;
    config.validate()?;

    tracing::info!("Connecting to database...");

    let pool = db::create_pool(
        &config.database_url,
        config.max_connections,
        config.acquire_timeout,
    )
    .await
    .context("Failed to create database pool")?;

    tracing::info!("Database connection pool created");

    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let repo = Arc::new(PgWorkflowRepository::new(pool));
    let reconciler = Reconciler::new(
        repo,
        Arc::new(LoggingRepollHandler),
        config.sweep_interval,
        config.sweep_window,
    );

    tokio::select! {
        result = reconciler.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    Ok(())
}
