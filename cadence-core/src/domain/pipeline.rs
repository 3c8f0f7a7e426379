//! Pipeline domain types
//!
//! Pipelines are owned by the platform's configuration service. The
//! orchestrator only reads them to scope workflows and sweeps.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::runner::StageType;

/// Deployment target (app x environment)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: i64,
    pub app_id: i64,
    pub environment_id: i64,
    pub deleted: bool,
    pub run_pre_stage_in_env: bool,
    pub run_post_stage_in_env: bool,
    pub deployment_app_name: String,
    pub deployment_app_type: DeploymentAppType,
}

impl Pipeline {
    /// Whether a stage runs inside the target environment's cluster
    /// rather than the platform's own build cluster
    pub fn runs_stage_in_env(&self, stage: StageType) -> bool {
        match stage {
            StageType::Pre => self.run_pre_stage_in_env,
            StageType::Post => self.run_post_stage_in_env,
            StageType::Deploy => false,
        }
    }
}

/// Mechanism used to roll the artifact out to the environment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentAppType {
    Helm,
    ArgoCd,
    ManifestDownload,
    ManifestPush,
    #[serde(untagged)]
    Other(String),
}

impl DeploymentAppType {
    pub fn as_str(&self) -> &str {
        match self {
            DeploymentAppType::Helm => "helm",
            DeploymentAppType::ArgoCd => "argo_cd",
            DeploymentAppType::ManifestDownload => "manifest_download",
            DeploymentAppType::ManifestPush => "manifest_push",
            DeploymentAppType::Other(raw) => raw,
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "helm" => DeploymentAppType::Helm,
            "argo_cd" => DeploymentAppType::ArgoCd,
            "manifest_download" => DeploymentAppType::ManifestDownload,
            "manifest_push" => DeploymentAppType::ManifestPush,
            other => DeploymentAppType::Other(other.to_string()),
        }
    }

    /// Health for this mechanism is only learned by actively polling the cluster
    pub fn is_poll_based(&self) -> bool {
        matches!(self, DeploymentAppType::Helm)
    }

    /// App types the reconciliation sweep covers
    pub fn poll_based() -> Vec<DeploymentAppType> {
        vec![DeploymentAppType::Helm]
    }
}

impl fmt::Display for DeploymentAppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-pipeline execution limits and defaults for stage pods
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub id: i64,
    pub pipeline_id: i64,
    pub timeout_seconds: Option<i64>,
    pub min_cpu: Option<String>,
    pub max_cpu: Option<String>,
    pub min_memory: Option<String>,
    pub max_memory: Option<String>,
    pub min_storage: Option<String>,
    pub max_storage: Option<String>,
    pub min_ephemeral_storage: Option<String>,
    pub max_ephemeral_storage: Option<String>,
    pub cache_bucket: Option<String>,
    pub cache_region: Option<String>,
    pub image: Option<String>,
    pub namespace: Option<String>,
    pub logs_bucket: Option<String>,
    pub artifact_location_format: Option<String>,
}
