//! Error taxonomy (kinds, not exhaustive type names) per the design's
//! error-handling section: configuration errors are fatal at startup,
//! guard mismatches are idempotent no-ops, infrastructure errors are
//! transient and retried by the owning loop.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("not found")]
    NotFound,

    /// A guarded compare-and-set `UPDATE` affected zero rows: either the
    /// job was redelivered after another worker already resolved it, or
    /// a dispatcher lost a race to lock it. Callers treat this as a
    /// no-op, not a failure.
    #[error("guard mismatch: {0}")]
    GuardMismatch(String),

    /// Infrastructure is unreachable or misbehaving (DB, broker). The
    /// owning loop logs and retries on its next tick.
    #[error("transient infrastructure error: {0}")]
    Transient(#[source] anyhow::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(#[source] anyhow::Error),
}

impl SchedulerError {
    pub fn is_guard_mismatch(&self) -> bool {
        matches!(self, SchedulerError::GuardMismatch(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SchedulerError::NotFound)
    }

    pub fn transient(err: impl Into<anyhow::Error>) -> Self {
        SchedulerError::Transient(err.into())
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
