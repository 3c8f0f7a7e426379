//! Reconciliation Service
//!
//! Periodically surfaces deploy runners of poll-based pipelines that are
//! still in flight, and hands them to an external re-poller. Nothing here
//! changes runner state; the re-poller reports back through the status path.

use anyhow::Result;
use async_trait::async_trait;
use cadence_core::domain::pipeline::DeploymentAppType;
use cadence_core::dto::reconcile::RepollCandidate;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, warn};

use thiserror::Error;

use crate::error::StoreError;
use crate::repository::WorkflowRepository;

/// Reconciliation error type
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("sweep window {0:?} is out of range")]
    InvalidWindow(Duration),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Deploy runners that need their live state re-polled
///
/// One candidate per pipeline, newest runner first. Only runners started
/// within `window` are returned.
pub async fn find_repoll_candidates(
    repo: &dyn WorkflowRepository,
    window: Duration,
) -> Result<Vec<RepollCandidate>, ReconcileError> {
    let started_after = chrono::Duration::from_std(window)
        .ok()
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .ok_or(ReconcileError::InvalidWindow(window))?;

    Ok(repo
        .stuck_runners(&DeploymentAppType::poll_based(), started_after)
        .await?)
}

/// Fetches live application state for a candidate and reports it back
#[async_trait]
pub trait RepollHandler: Send + Sync {
    async fn repoll(&self, candidate: &RepollCandidate) -> Result<()>;
}

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub candidates: usize,
    pub failed: usize,
}

/// Runs the reconciliation sweep on a fixed interval
pub struct Reconciler {
    repo: Arc<dyn WorkflowRepository>,
    handler: Arc<dyn RepollHandler>,
    interval: Duration,
    window: Duration,
}

impl Reconciler {
    pub fn new(
        repo: Arc<dyn WorkflowRepository>,
        handler: Arc<dyn RepollHandler>,
        interval: Duration,
        window: Duration,
    ) -> Self {
        Self {
            repo,
            handler,
            interval,
            window,
        }
    }

    /// Starts the sweep loop
    ///
    /// Never returns on its own; drop the future to stop it.
    pub async fn run(&self) -> Result<()> {
        info!(
            "Starting reconciliation sweep (interval: {:?}, window: {:?})",
            self.interval, self.window
        );

        let mut interval = time::interval(self.interval);

        loop {
            interval.tick().await;

            match self.run_once().await {
                Ok(report) => {
                    if report.candidates > 0 {
                        info!(
                            "Re-polled {} runner(s), {} failed",
                            report.candidates, report.failed
                        );
                    }
                }
                Err(e) => {
                    error!("Error during sweep cycle: {:#}", e);
                }
            }
        }
    }

    /// Performs a single sweep
    pub async fn run_once(&self) -> Result<SweepReport, ReconcileError> {
        let candidates = find_repoll_candidates(self.repo.as_ref(), self.window).await?;

        if candidates.is_empty() {
            debug!("No runners to re-poll");
            return Ok(SweepReport::default());
        }

        let mut report = SweepReport {
            candidates: candidates.len(),
            failed: 0,
        };

        for candidate in &candidates {
            if let Err(e) = self.handler.repoll(candidate).await {
                warn!(
                    "Failed to re-poll runner {} of pipeline {}: {:#}",
                    candidate.runner.id, candidate.pipeline_id, e
                );
                report.failed += 1;
            }
        }

        Ok(report)
    }
}
