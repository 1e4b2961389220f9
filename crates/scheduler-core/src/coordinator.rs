use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use scheduler_domain::{
    AtomicOutcome, AttemptStatus, Broker, BrokerMessage, CreateJobInput, EventFilter, EventType,
    ExecutionOutcome, Executor, Job, JobConstructionError, JobFilter, JobStatus, NewAttempt,
    NewEvent, Result, SchedulerError, Store,
};
use scheduler_outbox::Outbox;

use crate::timeline::{merge, TimelineEntry};

/// Everything that can go wrong building and persisting a new job:
/// either the input itself is invalid, or it's well-formed but the
/// store failed to durably record it.
#[derive(Debug, Error)]
pub enum CreateJobError {
    #[error(transparent)]
    Invalid(#[from] JobConstructionError),
    #[error(transparent)]
    Store(#[from] SchedulerError),
}

/// The job lifecycle coordinator: `create`, `process_job_message`,
/// `get_one`, `get_timeline`. Depends only on the capability traits in
/// `scheduler-domain`, never on a concrete store, broker or executor
/// implementation.
pub struct Coordinator {
    store: Arc<dyn Store>,
    broker: Arc<dyn Broker>,
    executor: Arc<dyn Executor>,
    outbox: Arc<Outbox>,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn Store>,
        broker: Arc<dyn Broker>,
        executor: Arc<dyn Executor>,
        outbox: Arc<Outbox>,
    ) -> Self {
        Self { store, broker, executor, outbox }
    }

    pub async fn create(&self, input: CreateJobInput) -> std::result::Result<Job, CreateJobError> {
        let job = Job::new(input, Utc::now())?;
        let inserted = job.clone();
        self.store
            .atomic(Box::new(move |uow| {
                let job = inserted.clone();
                Box::pin(async move {
                    uow.jobs().insert(job).await?;
                    Ok(AtomicOutcome::default())
                })
            }))
            .await?;
        Ok(job)
    }

    pub async fn get_one(&self, id: Uuid) -> Result<Job> {
        self.store.jobs().get_one(JobFilter { id: Some(id), ..Default::default() }).await
    }

    pub async fn get_timeline(&self, job_id: Uuid) -> Result<Vec<TimelineEntry>> {
        let events = self.store.events().get(EventFilter { job_id: Some(job_id) }).await?;
        let attempts = self
            .store
            .attempts()
            .get(scheduler_domain::AttemptFilter { job_id: Some(job_id), ..Default::default() })
            .await?;

        let mut entries: Vec<TimelineEntry> = events.into_iter().map(TimelineEntry::Stored).collect();
        for attempt in attempts {
            let (event_type, message) = match attempt.status {
                AttemptStatus::Success => (
                    EventType::JobSucceeded,
                    format!("attempt {} succeeded", attempt.attempt_number),
                ),
                AttemptStatus::Failed => (
                    EventType::JobFailed,
                    format!("attempt {} failed", attempt.attempt_number),
                ),
            };
            entries.push(TimelineEntry::Synthetic {
                job_id,
                event_type,
                message,
                created_at: attempt.created_at,
            });
        }

        Ok(merge(entries))
    }

    /// The central transactional algorithm, invoked by the worker per
    /// delivery. Runs the idempotence gate, the executor call, and
    /// outcome recording inside one transaction; publishes a staged
    /// retry only after that transaction has committed.
    ///
    /// `cancel` is the ambient cancellation context passed through to
    /// the executor: cancelling it surfaces as a transport-style
    /// failure on the in-flight callback, same as any other timeout.
    pub async fn process_job_message(&self, msg: BrokerMessage, cancel: CancellationToken) -> Result<()> {
        let job_id = msg.job_id;
        let executor = self.executor.clone();
        let outbox = self.outbox.clone();

        let outcome = self
            .store
            .atomic(Box::new(move |uow| {
                let msg = msg.clone();
                let executor = executor.clone();
                let outbox = outbox.clone();
                let cancel = cancel.clone();
                Box::pin(async move {
                    let job = match uow
                        .jobs()
                        .get_one(JobFilter { id: Some(job_id), ..Default::default() })
                        .await
                    {
                        Ok(job) => job,
                        Err(SchedulerError::NotFound) => return Ok(AtomicOutcome::default()),
                        Err(err) => return Err(err),
                    };

                    // Idempotence gate: a redelivery after the previous
                    // worker already transitioned the job must not
                    // re-execute the callback.
                    if job.status != JobStatus::Queued {
                        tracing::debug!(
                            job_id = %job_id,
                            status = %job.status,
                            "dropping redelivered message, job is not queued"
                        );
                        return Ok(AtomicOutcome::default());
                    }

                    uow.jobs().mark_running(job_id).await?;

                    let started_at = Utc::now();
                    let result = executor.execute(&job, &cancel).await;

                    let (attempt_status, error_message, http_status) = match &result {
                        ExecutionOutcome::Success { http_status } => {
                            (AttemptStatus::Success, None, Some(*http_status))
                        }
                        ExecutionOutcome::Failure { http_status, message } => {
                            (AttemptStatus::Failed, Some(message.clone()), Some(*http_status))
                        }
                    };

                    uow.attempts()
                        .insert(NewAttempt {
                            job_id,
                            attempt_number: msg.attempt,
                            started_at,
                            status: attempt_status,
                            error_message,
                            http_status,
                        })
                        .await?;

                    match result {
                        ExecutionOutcome::Success { .. } => {
                            uow.jobs().mark_completed(job_id).await?;
                            uow.events()
                                .insert(NewEvent {
                                    job_id,
                                    event_type: EventType::JobSucceeded,
                                    message: "callback succeeded".to_string(),
                                    metadata: None,
                                })
                                .await?;
                            metrics::counter!("scheduler_worker_attempts_total", &[("outcome", "success")])
                                .increment(1);
                            Ok(AtomicOutcome::default())
                        }
                        ExecutionOutcome::Failure { http_status, message } => {
                            uow.jobs().mark_failed(job_id, &message, Some(http_status)).await?;
                            uow.events()
                                .insert(NewEvent {
                                    job_id,
                                    event_type: EventType::JobFailed,
                                    message: message.clone(),
                                    metadata: None,
                                })
                                .await?;

                            if msg.attempt <= job.max_retries {
                                let retry = msg.with_incremented_attempt();
                                outbox.stage(job_id, retry.clone());
                                metrics::counter!("scheduler_worker_attempts_total", &[("outcome", "retried")])
                                    .increment(1);
                                Ok(AtomicOutcome { retry: Some(retry) })
                            } else {
                                uow.jobs().mark_dead(job_id, "retry budget exhausted").await?;
                                uow.events()
                                    .insert(NewEvent {
                                        job_id,
                                        event_type: EventType::JobDead,
                                        message: "retry budget exhausted".to_string(),
                                        metadata: None,
                                    })
                                    .await?;
                                metrics::counter!("scheduler_worker_attempts_total", &[("outcome", "dead")])
                                    .increment(1);
                                Ok(AtomicOutcome::default())
                            }
                        }
                    }
                })
            }))
            .await?;

        if outcome.retry.is_some() {
            if let Some(retry) = self.outbox.take(job_id) {
                self.broker.publish(&retry).await?;
            }
        }

        Ok(())
    }
}
