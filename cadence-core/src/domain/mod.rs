//! Core domain types
//!
//! The entities the orchestrator persists and reasons about. These types carry
//! no I/O; persistence lives in the orchestrator's repository layer.

pub mod pipeline;
pub mod runner;
pub mod status;
pub mod workflow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who created and last touched a row, and when
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLog {
    pub created_on: DateTime<Utc>,
    pub created_by: i32,
    pub updated_on: DateTime<Utc>,
    pub updated_by: i32,
}

impl AuditLog {
    /// Audit stamp for a row created now by `user`
    pub fn created_now(user: i32) -> Self {
        let now = Utc::now();
        Self {
            created_on: now,
            created_by: user,
            updated_on: now,
            updated_by: user,
        }
    }

    /// Record a modification by `user`
    pub fn touch(&mut self, user: i32) {
        self.updated_on = Utc::now();
        self.updated_by = user;
    }
}
