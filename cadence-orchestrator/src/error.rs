//! Store Errors
//!
//! Error taxonomy shared by every repository implementation.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by the workflow store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Row with the given key does not exist
    #[error("{entity} {key} not found")]
    NotFound { entity: &'static str, key: String },

    /// Foreign key, uniqueness or check constraint rejected the write
    #[error("constraint violation ({}): {message}", .constraint.as_deref().unwrap_or("unnamed"))]
    ConstraintViolation {
        constraint: Option<String>,
        message: String,
    },

    /// Connectivity problem or timeout; the caller may retry
    #[error("transient store error: {0}")]
    Transient(#[source] sqlx::Error),

    /// Any other database failure
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn constraint(constraint: &str, message: impl Into<String>) -> Self {
        StoreError::ConstraintViolation {
            constraint: Some(constraint.to_string()),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }

    /// Whether this error is the named constraint rejecting a write
    pub fn violates(&self, name: &str) -> bool {
        matches!(self, StoreError::ConstraintViolation { constraint: Some(c), .. } if c == name)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound {
                entity: "row",
                key: String::new(),
            },
            sqlx::Error::Database(db)
                if db.is_foreign_key_violation()
                    || db.is_unique_violation()
                    || db.is_check_violation() =>
            {
                StoreError::ConstraintViolation {
                    constraint: db.constraint().map(str::to_string),
                    message: db.message().to_string(),
                }
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Transient(err),
            other => StoreError::Database(other),
        }
    }
}
