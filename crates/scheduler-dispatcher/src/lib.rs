//! Dispatcher tick logic, generalized from `original_source/dispatcher.go`'s
//! `RunOnce`: fetch eligible pending jobs, lock each, publish a broker
//! message, and mark it queued. Exposed as a library so the tick can be
//! exercised against in-memory fakes without a real Postgres/RabbitMQ.

use std::sync::Arc;

use scheduler_domain::{Broker, BrokerMessage, JobFilter, JobStatus, Result, SchedulerError, Store};

pub const DEFAULT_BATCH_SIZE: i64 = 50;

/// One dispatcher tick: scan, lock, publish, mark-queued.
pub async fn run_tick(
    store: &Arc<dyn Store>,
    broker: &Arc<dyn Broker>,
    node_id: &str,
    lock_ttl_seconds: i64,
    batch_size: i64,
) -> Result<usize> {
    let candidates = store
        .jobs()
        .get(JobFilter {
            status: Some(JobStatus::Pending),
            ready_to_run: Some(true),
            lock_free: Some(true),
            lock_timeout_seconds: Some(lock_ttl_seconds),
            limit: Some(batch_size),
            ..Default::default()
        })
        .await?;

    let mut dispatched = 0;
    for job in candidates {
        match store.jobs().lock_job(job.id, node_id, lock_ttl_seconds).await {
            Ok(()) => {}
            Err(err) if err.is_guard_mismatch() => {
                tracing::debug!(job_id = %job.id, "lock not acquired, another dispatcher won");
                continue;
            }
            Err(err) => return Err(err),
        }

        let message = BrokerMessage {
            job_id: job.id,
            job_type: job.job_type.clone(),
            callback_url: job.callback_url.clone(),
            payload: job.payload.clone(),
            attempt: 1,
        };

        if let Err(err) = broker.publish(&message).await {
            // Lock is left in place; it expires after LOCK_TTL and a
            // future tick (this node or a peer) will retry.
            tracing::warn!(job_id = %job.id, error = %err, "publish failed, leaving job locked for retry");
            continue;
        }

        if let Err(err) = store.jobs().mark_queued(job.id).await {
            // The message is already on the broker; a worker will pick
            // it up regardless of whether this transition lands.
            tracing::warn!(job_id = %job.id, error = %err, "mark_queued failed after successful publish");
        }

        dispatched += 1;
    }

    metrics::counter!("scheduler_dispatcher_jobs_dispatched_total").increment(dispatched as u64);
    Ok(dispatched)
}

pub fn is_recoverable(err: &SchedulerError) -> bool {
    matches!(err, SchedulerError::Transient(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use scheduler_domain::{CreateJobInput, Job, JobStore};
    use scheduler_testing::{InMemoryStore, RecordingBroker};

    fn sample(priority: i32) -> Job {
        Job::new(
            CreateJobInput {
                job_type: "ping".into(),
                callback_url: "http://cb/ok".into(),
                payload: serde_json::json!({}),
                scheduled_at: None,
                max_retries: 3,
                priority,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn dispatches_ready_jobs_and_marks_queued() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let broker = Arc::new(RecordingBroker::new());
        let broker_dyn: Arc<dyn Broker> = broker.clone();

        let job = sample(0);
        let job_id = job.id;
        store.jobs().insert(job).await.unwrap();

        let dispatched = run_tick(&store, &broker_dyn, "dispatcher-1", 300, DEFAULT_BATCH_SIZE)
            .await
            .unwrap();

        assert_eq!(dispatched, 1);
        let job = store.jobs().get_one(JobFilter { id: Some(job_id), ..Default::default() }).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(broker.published().await.len(), 1);
    }

    #[tokio::test]
    async fn scheduled_in_future_is_not_dispatched() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let broker: Arc<dyn Broker> = Arc::new(RecordingBroker::new());

        let mut job = sample(0);
        job.scheduled_at = Some(Utc::now() + chrono::Duration::seconds(30));
        store.jobs().insert(job).await.unwrap();

        let dispatched = run_tick(&store, &broker, "dispatcher-1", 300, DEFAULT_BATCH_SIZE).await.unwrap();
        assert_eq!(dispatched, 0);
    }
}
