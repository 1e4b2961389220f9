use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use scheduler_domain::{
    Atomic, AtomicOutcome, AtomicResult, Attempt, AttemptFilter, AttemptStatus, AttemptStore,
    Event, EventFilter, EventStore, Job, JobFilter, JobStatus, JobStore, NewAttempt,
    NewEvent, Result, SchedulerError, UnitOfWork, DEFAULT_LOCK_TTL_SECONDS,
};

/// A single in-process struct playing `JobStore`, `AttemptStore`,
/// `EventStore`, `UnitOfWork` and `Atomic` all at once. `atomic` is
/// approximated with snapshot/restore rather than a real transaction
/// log: the outermost call snapshots all three maps, and restores them
/// if the closure returns `Err`. Nested calls join the outer one
/// without re-snapshotting, mirroring the reentrant-join contract.
pub struct InMemoryStore {
    jobs: DashMap<Uuid, Job>,
    attempts: DashMap<i64, Attempt>,
    events: DashMap<i64, Event>,
    next_attempt_id: AtomicI64,
    next_event_id: AtomicI64,
    depth: AtomicUsize,
}

struct Snapshot {
    jobs: DashMap<Uuid, Job>,
    attempts: DashMap<i64, Attempt>,
    events: DashMap<i64, Event>,
    next_attempt_id: i64,
    next_event_id: i64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            jobs: DashMap::new(),
            attempts: DashMap::new(),
            events: DashMap::new(),
            next_attempt_id: AtomicI64::new(1),
            next_event_id: AtomicI64::new(1),
            depth: AtomicUsize::new(0),
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: fetch a job directly without going through the
    /// `JobStore` filter machinery.
    pub fn job(&self, id: Uuid) -> Option<Job> {
        self.jobs.get(&id).map(|r| r.clone())
    }

    pub fn attempts_for(&self, job_id: Uuid) -> Vec<Attempt> {
        let mut out: Vec<Attempt> = self.attempts.iter().filter(|a| a.job_id == job_id).map(|a| a.clone()).collect();
        out.sort_by_key(|a| a.attempt_number);
        out
    }

    /// Test helper: force a job straight to `status`, bypassing the
    /// guarded transitions. Scenario tests use this to stand in for the
    /// dispatcher, which lives in a separate crate.
    pub fn force_status(&self, id: Uuid, status: JobStatus) {
        if let Some(mut job) = self.jobs.get_mut(&id) {
            job.status = status;
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            jobs: self.jobs.clone(),
            attempts: self.attempts.clone(),
            events: self.events.clone(),
            next_attempt_id: self.next_attempt_id.load(Ordering::SeqCst),
            next_event_id: self.next_event_id.load(Ordering::SeqCst),
        }
    }

    fn restore(&self, snapshot: Snapshot) {
        self.jobs.clear();
        for pair in snapshot.jobs.iter() {
            self.jobs.insert(*pair.key(), pair.value().clone());
        }
        self.attempts.clear();
        for pair in snapshot.attempts.iter() {
            self.attempts.insert(*pair.key(), pair.value().clone());
        }
        self.events.clear();
        for pair in snapshot.events.iter() {
            self.events.insert(*pair.key(), pair.value().clone());
        }
        self.next_attempt_id.store(snapshot.next_attempt_id, Ordering::SeqCst);
        self.next_event_id.store(snapshot.next_event_id, Ordering::SeqCst);
    }

    fn guarded_status_update(&self, id: Uuid, allowed_from: &[JobStatus], to: JobStatus) -> Result<()> {
        let mut job = self
            .jobs
            .get_mut(&id)
            .ok_or(SchedulerError::GuardMismatch(format!("job {id} does not exist")))?;
        if !allowed_from.contains(&job.status) {
            return Err(SchedulerError::GuardMismatch(format!(
                "job {id} was not in an expected prior status (found {})",
                job.status
            )));
        }
        job.status = to;
        job.updated_at = Utc::now();
        Ok(())
    }
}

fn matches_filter(job: &Job, filter: &JobFilter, now: chrono::DateTime<Utc>) -> bool {
    if let Some(id) = filter.id {
        if job.id != id {
            return false;
        }
    }
    if let Some(job_type) = &filter.job_type {
        if &job.job_type != job_type {
            return false;
        }
    }
    if let Some(status) = filter.status {
        if job.status != status {
            return false;
        }
    }
    if filter.ready_to_run == Some(true) && !job.is_ready_to_run(now) {
        return false;
    }
    if filter.lock_free == Some(true) {
        let ttl = filter.lock_timeout_seconds.unwrap_or(DEFAULT_LOCK_TTL_SECONDS);
        if job.locked_at.is_some() && job.is_lock_fresh(now, ttl) {
            return false;
        }
    }
    true
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn insert(&self, job: Job) -> Result<Job> {
        self.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_one(&self, filter: JobFilter) -> Result<Job> {
        self.get(filter).await?.into_iter().next().ok_or(SchedulerError::NotFound)
    }

    async fn get(&self, filter: JobFilter) -> Result<Vec<Job>> {
        let now = Utc::now();
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .map(|r| r.clone())
            .filter(|j| matches_filter(j, &filter, now))
            .collect();
        jobs.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| match (a.scheduled_at, b.scheduled_at) {
                    (None, None) => std::cmp::Ordering::Equal,
                    (None, Some(_)) => std::cmp::Ordering::Less,
                    (Some(_), None) => std::cmp::Ordering::Greater,
                    (Some(x), Some(y)) => x.cmp(&y),
                })
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        if let Some(limit) = filter.limit {
            jobs.truncate(limit.max(0) as usize);
        }
        Ok(jobs)
    }

    async fn lock_job(&self, id: Uuid, owner: &str, lock_ttl_seconds: i64) -> Result<()> {
        let now = Utc::now();
        let mut job = self
            .jobs
            .get_mut(&id)
            .ok_or(SchedulerError::GuardMismatch(format!("job {id} does not exist")))?;
        let lock_expired = match job.locked_at {
            Some(at) => at < now - chrono::Duration::seconds(lock_ttl_seconds),
            None => true,
        };
        if job.status != JobStatus::Pending || !lock_expired {
            return Err(SchedulerError::GuardMismatch(format!(
                "job {id} is not pending or its lock is still held"
            )));
        }
        job.locked_at = Some(now);
        job.locked_by = Some(owner.to_string());
        job.updated_at = now;
        Ok(())
    }

    async fn mark_queued(&self, id: Uuid) -> Result<()> {
        self.guarded_status_update(id, &[JobStatus::Pending], JobStatus::Queued)
    }

    async fn mark_running(&self, id: Uuid) -> Result<()> {
        self.guarded_status_update(id, &[JobStatus::Queued], JobStatus::Running)
    }

    async fn mark_completed(&self, id: Uuid) -> Result<()> {
        let now = Utc::now();
        let mut job = self
            .jobs
            .get_mut(&id)
            .ok_or(SchedulerError::GuardMismatch(format!("job {id} does not exist")))?;
        if job.status != JobStatus::Running {
            return Err(SchedulerError::GuardMismatch(format!("job {id} was not running")));
        }
        job.status = JobStatus::Completed;
        job.completed_at = Some(now);
        job.locked_at = None;
        job.locked_by = None;
        job.updated_at = now;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, err_msg: &str, http_status: Option<i32>) -> Result<()> {
        tracing::debug!(job_id = %id, error = err_msg, http_status, "marking job failed");
        let now = Utc::now();
        let mut job = self
            .jobs
            .get_mut(&id)
            .ok_or(SchedulerError::GuardMismatch(format!("job {id} does not exist")))?;
        if job.status != JobStatus::Running {
            return Err(SchedulerError::GuardMismatch(format!("job {id} was not running")));
        }
        job.status = JobStatus::Failed;
        job.locked_at = None;
        job.locked_by = None;
        job.updated_at = now;
        Ok(())
    }

    async fn mark_dead(&self, id: Uuid, reason: &str) -> Result<()> {
        tracing::debug!(job_id = %id, reason, "moving job to dead letter");
        self.guarded_status_update(id, &[JobStatus::Failed, JobStatus::Running], JobStatus::Dead)
    }
}

#[async_trait]
impl AttemptStore for InMemoryStore {
    async fn insert(&self, attempt: NewAttempt) -> Result<Attempt> {
        let id = self.next_attempt_id.fetch_add(1, Ordering::SeqCst);
        let record = Attempt {
            id,
            job_id: attempt.job_id,
            attempt_number: attempt.attempt_number,
            started_at: attempt.started_at,
            status: attempt.status,
            error_message: attempt.error_message,
            http_status: attempt.http_status,
            created_at: Utc::now(),
        };
        self.attempts.insert(id, record.clone());
        Ok(record)
    }

    async fn get(&self, filter: AttemptFilter) -> Result<Vec<Attempt>> {
        let mut out: Vec<Attempt> = self
            .attempts
            .iter()
            .map(|r| r.clone())
            .filter(|a| filter.id.map(|id| id == a.id).unwrap_or(true))
            .filter(|a| filter.job_id.map(|job_id| job_id == a.job_id).unwrap_or(true))
            .filter(|a| filter.status.map(|s| s == a.status).unwrap_or(true))
            .collect();
        out.sort_by_key(|a| a.attempt_number);
        Ok(out)
    }

    async fn count(&self, filter: AttemptFilter) -> Result<i64> {
        Ok(self.get(filter).await?.len() as i64)
    }
}

#[async_trait]
impl EventStore for InMemoryStore {
    async fn insert(&self, event: NewEvent) -> Result<Event> {
        let id = self.next_event_id.fetch_add(1, Ordering::SeqCst);
        let record = Event {
            id,
            job_id: event.job_id,
            event_type: event.event_type,
            message: event.message,
            metadata: event.metadata,
            created_at: Utc::now(),
        };
        self.events.insert(id, record.clone());
        Ok(record)
    }

    async fn get(&self, filter: EventFilter) -> Result<Vec<Event>> {
        let mut out: Vec<Event> = self
            .events
            .iter()
            .map(|r| r.clone())
            .filter(|e| filter.job_id.map(|job_id| job_id == e.job_id).unwrap_or(true))
            .collect();
        out.sort_by_key(|e| e.created_at);
        Ok(out)
    }
}

impl UnitOfWork for InMemoryStore {
    fn jobs(&self) -> &dyn JobStore {
        self
    }

    fn attempts(&self) -> &dyn AttemptStore {
        self
    }

    fn events(&self) -> &dyn EventStore {
        self
    }
}

#[async_trait]
impl Atomic for InMemoryStore {
    async fn atomic(
        &self,
        f: Box<dyn for<'c> FnOnce(&'c dyn UnitOfWork) -> AtomicResult<'c, AtomicOutcome> + Send + '_>,
    ) -> Result<AtomicOutcome> {
        let is_outer = self.depth.fetch_add(1, Ordering::SeqCst) == 0;
        let snapshot = if is_outer { Some(self.snapshot()) } else { None };

        let outcome = f(self).await;

        self.depth.fetch_sub(1, Ordering::SeqCst);
        if outcome.is_err() {
            if let Some(snapshot) = snapshot {
                self.restore(snapshot);
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_domain::CreateJobInput;

    fn new_job() -> Job {
        Job::new(
            CreateJobInput {
                job_type: "ping".into(),
                callback_url: "http://cb/ok".into(),
                payload: serde_json::json!({}),
                scheduled_at: None,
                max_retries: 3,
                priority: 0,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn lock_job_is_exclusive_to_one_caller() {
        let store = InMemoryStore::new();
        let job = new_job();
        let id = job.id;
        store.insert(job).await.unwrap();

        let first = store.lock_job(id, "dispatcher-a", 300).await;
        let second = store.lock_job(id, "dispatcher-b", 300).await;
        assert!(first.is_ok());
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let store = InMemoryStore::new();
        let job = new_job();
        let id = job.id;
        store.insert(job).await.unwrap();

        // pending -> running is not a legal direct transition.
        let err = store.mark_running(id).await.unwrap_err();
        assert!(err.is_guard_mismatch());
    }

    #[tokio::test]
    async fn atomic_rolls_back_on_error() {
        let store = InMemoryStore::new();
        let job = new_job();
        let id = job.id;
        store.insert(job).await.unwrap();
        store.mark_queued(id).await.unwrap();

        let result = Atomic::atomic(
            &store,
            Box::new(move |uow| {
                Box::pin(async move {
                    uow.jobs().mark_running(id).await?;
                    Err(SchedulerError::Transient(anyhow::anyhow!("simulated crash")))
                })
            }),
        )
        .await;

        assert!(result.is_err());
        let job = store.job(id).unwrap();
        assert_eq!(job.status, JobStatus::Queued);
    }
}
