//! Persistence contract: a scoped unit of work with guaranteed
//! release (commit on success, rollback on any error or abnormal
//! exit), and the repository operations the coordinator needs.
//!
//! `Atomic(fn)` runs `fn` against a view of the store where every
//! repository call participates in the same transaction; a nested
//! `Atomic` joins the enclosing transaction rather than opening a
//! savepoint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::broker::BrokerMessage;
use crate::error::Result;
use crate::job::{Attempt, AttemptFilter, AttemptStatus, Event, EventFilter, EventType, Job, JobFilter};

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: Job) -> Result<Job>;
    async fn get_one(&self, filter: JobFilter) -> Result<Job>;
    async fn get(&self, filter: JobFilter) -> Result<Vec<Job>>;

    /// Atomic CAS: sets `locked_at/locked_by` only if the row's current
    /// status is `pending` and the existing lock (if any) is older than
    /// `lock_ttl_seconds`. Returns `SchedulerError::GuardMismatch` if
    /// zero rows matched. Callers must pass the same TTL used to select
    /// the candidate via `JobFilter::lock_timeout_seconds`, or the
    /// freshness check here can reject a row the selection considered
    /// stale.
    async fn lock_job(&self, id: Uuid, owner: &str, lock_ttl_seconds: i64) -> Result<()>;

    async fn mark_queued(&self, id: Uuid) -> Result<()>;
    async fn mark_running(&self, id: Uuid) -> Result<()>;
    async fn mark_completed(&self, id: Uuid) -> Result<()>;
    async fn mark_failed(&self, id: Uuid, err_msg: &str, http_status: Option<i32>) -> Result<()>;
    async fn mark_dead(&self, id: Uuid, reason: &str) -> Result<()>;
}

/// Fields needed to record an attempt; the store assigns `id`.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub job_id: Uuid,
    pub attempt_number: i32,
    pub started_at: DateTime<Utc>,
    pub status: AttemptStatus,
    pub error_message: Option<String>,
    pub http_status: Option<i32>,
}

#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn insert(&self, attempt: NewAttempt) -> Result<Attempt>;
    async fn get(&self, filter: AttemptFilter) -> Result<Vec<Attempt>>;
    async fn count(&self, filter: AttemptFilter) -> Result<i64>;
}

/// Fields needed to record an event; the store assigns `id`.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub job_id: Uuid,
    pub event_type: EventType,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert(&self, event: NewEvent) -> Result<Event>;
    async fn get(&self, filter: EventFilter) -> Result<Vec<Event>>;
}

/// Side effect staged inside a transaction but only meaningful once the
/// transaction has committed (Design Note 3): the retry-after-commit
/// mechanism. The atomic closure returns this instead of publishing
/// directly, so the coordinator can publish only after a successful
/// commit.
#[derive(Debug, Clone, Default)]
pub struct AtomicOutcome {
    pub retry: Option<BrokerMessage>,
}

pub type AtomicResult<'a, T> = BoxFuture<'a, Result<T>>;

/// A transaction-scoped view: every repository call made through this
/// handle participates in the same in-flight transaction.
pub trait UnitOfWork: Send + Sync {
    fn jobs(&self) -> &dyn JobStore;
    fn attempts(&self) -> &dyn AttemptStore;
    fn events(&self) -> &dyn EventStore;
}

#[async_trait]
pub trait Atomic: Send + Sync {
    /// Runs `f` inside a transaction. Commits on `Ok`, rolls back on
    /// `Err` or panic (rollback errors are composed with the original
    /// error rather than discarded). Reentrant: if called while already
    /// inside a transaction, `f` runs against the enclosing one.
    async fn atomic(
        &self,
        f: Box<dyn for<'c> FnOnce(&'c dyn UnitOfWork) -> AtomicResult<'c, AtomicOutcome> + Send + '_>,
    ) -> Result<AtomicOutcome>;
}

/// A unit of work that is also its own transaction root. The
/// coordinator depends only on this, never on a concrete store crate.
pub trait Store: UnitOfWork + Atomic {}

impl<T: UnitOfWork + Atomic> Store for T {}
