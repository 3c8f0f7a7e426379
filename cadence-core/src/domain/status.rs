//! Runner status taxonomy
//!
//! Runners receive statuses from three vocabularies: the internal stage engine,
//! an external workflow engine, and live cluster/GitOps application health.
//! This module folds them into one canonical set and classifies each status
//! as terminal or not.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Canonical runner status
///
/// Parsing is case-insensitive; the canonical spelling is what gets persisted.
/// Unrecognised vocabulary is kept verbatim in [`RunnerStatus::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RunnerStatus {
    Queued,
    Starting,
    Initiating,
    Progressing,
    /// External workflow engine: pod scheduled, not yet running
    Pending,
    /// External workflow engine: executing
    Running,
    Succeeded,
    Failed,
    Aborted,
    /// External workflow engine: errored outside the user's workload
    Error,
    TimedOut,
    UnableToFetch,
    /// Application health
    Healthy,
    /// Application health
    Degraded,
    /// Application scaled to zero
    Hibernating,
    Other(String),
}

/// Terminal classification of a status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusClass {
    NonTerminal,
    TerminalSuccess,
    TerminalFailure,
    /// Stable but not running, e.g. hibernating or degraded
    TerminalExternal,
}

impl StatusClass {
    pub fn is_terminal(self) -> bool {
        !matches!(self, StatusClass::NonTerminal)
    }
}

impl RunnerStatus {
    /// Every status with a canonical spelling, in declaration order
    pub const KNOWN: [RunnerStatus; 15] = [
        RunnerStatus::Queued,
        RunnerStatus::Starting,
        RunnerStatus::Initiating,
        RunnerStatus::Progressing,
        RunnerStatus::Pending,
        RunnerStatus::Running,
        RunnerStatus::Succeeded,
        RunnerStatus::Failed,
        RunnerStatus::Aborted,
        RunnerStatus::Error,
        RunnerStatus::TimedOut,
        RunnerStatus::UnableToFetch,
        RunnerStatus::Healthy,
        RunnerStatus::Degraded,
        RunnerStatus::Hibernating,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            RunnerStatus::Queued => "Queued",
            RunnerStatus::Starting => "Starting",
            RunnerStatus::Initiating => "Initiating",
            RunnerStatus::Progressing => "Progressing",
            RunnerStatus::Pending => "Pending",
            RunnerStatus::Running => "Running",
            RunnerStatus::Succeeded => "Succeeded",
            RunnerStatus::Failed => "Failed",
            RunnerStatus::Aborted => "Aborted",
            RunnerStatus::Error => "Error",
            RunnerStatus::TimedOut => "TimedOut",
            RunnerStatus::UnableToFetch => "UnableToFetch",
            RunnerStatus::Healthy => "Healthy",
            RunnerStatus::Degraded => "Degraded",
            RunnerStatus::Hibernating => "Hibernating",
            RunnerStatus::Other(raw) => raw,
        }
    }

    /// Parse a raw status from any source vocabulary
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        Self::KNOWN
            .into_iter()
            .find(|known| known.as_str().eq_ignore_ascii_case(trimmed))
            .unwrap_or_else(|| RunnerStatus::Other(trimmed.to_string()))
    }

    pub fn class(&self) -> StatusClass {
        match self {
            RunnerStatus::Succeeded | RunnerStatus::Healthy => StatusClass::TerminalSuccess,
            RunnerStatus::Failed
            | RunnerStatus::Aborted
            | RunnerStatus::Error
            | RunnerStatus::TimedOut => StatusClass::TerminalFailure,
            RunnerStatus::Hibernating | RunnerStatus::Degraded => StatusClass::TerminalExternal,
            RunnerStatus::Queued
            | RunnerStatus::Starting
            | RunnerStatus::Initiating
            | RunnerStatus::Progressing
            | RunnerStatus::Pending
            | RunnerStatus::Running
            | RunnerStatus::UnableToFetch
            | RunnerStatus::Other(_) => StatusClass::NonTerminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.class().is_terminal()
    }

    /// Accepted but not yet executing
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            RunnerStatus::Queued
                | RunnerStatus::Initiating
                | RunnerStatus::Starting
                | RunnerStatus::Pending
        )
    }

    /// Every canonical terminal status
    pub fn terminal() -> Vec<RunnerStatus> {
        Self::KNOWN
            .into_iter()
            .filter(|status| status.is_terminal())
            .collect()
    }

    /// Statuses the reconciliation sweep never surfaces: terminal or pending
    pub fn sweep_excluded() -> Vec<RunnerStatus> {
        Self::KNOWN
            .into_iter()
            .filter(|status| status.is_terminal() || status.is_pending())
            .collect()
    }
}

/// Classify a raw status string without keeping the parsed value
pub fn classify(raw: &str) -> StatusClass {
    RunnerStatus::parse(raw).class()
}

impl fmt::Display for RunnerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunnerStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RunnerStatus::parse(s))
    }
}

impl From<&str> for RunnerStatus {
    fn from(raw: &str) -> Self {
        RunnerStatus::parse(raw)
    }
}

impl Serialize for RunnerStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RunnerStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(RunnerStatus::parse(&raw))
    }
}
