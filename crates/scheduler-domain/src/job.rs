//! Entities and the job lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Default lease on a dispatcher's lock before it is considered expired.
pub const DEFAULT_LOCK_TTL_SECONDS: i64 = 300;

/// A job's position in the lifecycle state machine.
///
/// `disabled` is reserved for an external admin action; no transition
/// into it is implemented by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Dead,
    Disabled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Dead | JobStatus::Disabled)
    }

    /// Whether `self -> next` is a transition named in the state machine.
    /// Used by tests and by store implementations' debug assertions; the
    /// guarded `UPDATE ... WHERE status = ...` statements are the actual
    /// enforcement mechanism at runtime.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Queued)
                | (Queued, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Dead)
                | (Failed, Dead)
        ) || (!self.is_terminal() && next == Disabled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Dead => "dead",
            JobStatus::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

/// A unit of work: a callback to deliver at least once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub callback_url: String,
    pub payload: Value,
    pub status: JobStatus,
    pub max_retries: i32,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn is_ready_to_run(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at.map(|at| at <= now).unwrap_or(true)
    }

    pub fn is_lock_fresh(&self, now: DateTime<Utc>, lock_ttl_seconds: i64) -> bool {
        match self.locked_at {
            Some(at) => at >= now - chrono::Duration::seconds(lock_ttl_seconds),
            None => false,
        }
    }
}

/// Input to construct a new job. Construction performs no I/O; validation
/// is limited to the two invariants named in the spec (non-negative
/// retry budget, non-empty callback URL).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobInput {
    pub job_type: String,
    pub callback_url: String,
    pub payload: Value,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub max_retries: i32,
    pub priority: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum JobConstructionError {
    #[error("callback_url must not be empty")]
    EmptyCallbackUrl,
    #[error("max_retries must be non-negative, got {0}")]
    NegativeMaxRetries(i32),
}

impl Job {
    /// Pure constructor: generates an id and `created_at`, begins in
    /// `pending` with `scheduled_at` copied verbatim from the input.
    pub fn new(input: CreateJobInput, now: DateTime<Utc>) -> Result<Job, JobConstructionError> {
        if input.callback_url.trim().is_empty() {
            return Err(JobConstructionError::EmptyCallbackUrl);
        }
        if input.max_retries < 0 {
            return Err(JobConstructionError::NegativeMaxRetries(input.max_retries));
        }
        Ok(Job {
            id: Uuid::new_v4(),
            job_type: input.job_type,
            callback_url: input.callback_url,
            payload: input.payload,
            status: JobStatus::Pending,
            max_retries: input.max_retries,
            scheduled_at: input.scheduled_at,
            locked_at: None,
            locked_by: None,
            completed_at: None,
            priority: input.priority,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Filter for `JobStore::get` / `get_one`.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub id: Option<Uuid>,
    pub job_type: Option<String>,
    pub status: Option<JobStatus>,
    /// `true` => only rows with `is_ready_to_run(now)`.
    pub ready_to_run: Option<bool>,
    /// `true` => only rows that are unlocked or whose lock has expired.
    /// `lock_timeout` overrides `DEFAULT_LOCK_TTL_SECONDS` for the
    /// freshness check when set.
    pub lock_free: Option<bool>,
    pub lock_timeout_seconds: Option<i64>,
    pub limit: Option<i64>,
}

/// Terminal outcome of one executor invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Success,
    Failed,
}

/// One record per executor invocation. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub job_id: Uuid,
    pub attempt_number: i32,
    pub started_at: DateTime<Utc>,
    pub status: AttemptStatus,
    pub error_message: Option<String>,
    /// 0 means "no response, transport error" (see Design Note 2).
    pub http_status: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct AttemptFilter {
    pub id: Option<i64>,
    pub job_id: Option<Uuid>,
    pub status: Option<AttemptStatus>,
}

/// Audit-entry event type in a job's timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    JobCreated,
    JobQueued,
    JobRunning,
    JobSucceeded,
    JobFailed,
    JobDead,
}

/// Append-only audit entry in a job's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub job_id: Uuid,
    pub event_type: EventType,
    pub message: String,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub job_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_input() -> CreateJobInput {
        CreateJobInput {
            job_type: "ping".into(),
            callback_url: "http://cb/ok".into(),
            payload: serde_json::json!({}),
            scheduled_at: None,
            max_retries: 3,
            priority: 0,
        }
    }

    #[test]
    fn new_job_starts_pending_with_generated_id() {
        let now = Utc::now();
        let job = Job::new(sample_input(), now).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.created_at, now);
        assert_eq!(job.updated_at, now);
        assert!(job.locked_at.is_none());
    }

    #[test]
    fn rejects_empty_callback_url() {
        let mut input = sample_input();
        input.callback_url = "  ".into();
        assert!(matches!(
            Job::new(input, Utc::now()),
            Err(JobConstructionError::EmptyCallbackUrl)
        ));
    }

    #[test]
    fn rejects_negative_max_retries() {
        let mut input = sample_input();
        input.max_retries = -1;
        assert!(matches!(
            Job::new(input, Utc::now()),
            Err(JobConstructionError::NegativeMaxRetries(-1))
        ));
    }

    #[test]
    fn state_machine_rejects_illegal_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Dead));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Disabled));
    }

    #[test]
    fn ready_to_run_is_true_when_schedule_is_null_or_past() {
        let now = Utc::now();
        let mut job = Job::new(sample_input(), now).unwrap();
        assert!(job.is_ready_to_run(now));
        job.scheduled_at = Some(now + chrono::Duration::seconds(10));
        assert!(!job.is_ready_to_run(now));
        job.scheduled_at = Some(now - chrono::Duration::seconds(10));
        assert!(job.is_ready_to_run(now));
    }
}
