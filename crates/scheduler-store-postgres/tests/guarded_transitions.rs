#![cfg(feature = "postgres-integration")]

use chrono::Utc;
use scheduler_domain::{CreateJobInput, Job, JobFilter, JobStatus, JobStore, SchedulerError};
use scheduler_store_postgres::JobRepository;
use sqlx::PgPool;

fn job_input() -> CreateJobInput {
    CreateJobInput {
        job_type: "ping".into(),
        callback_url: "http://cb/ok".into(),
        payload: serde_json::json!({}),
        scheduled_at: None,
        max_retries: 3,
        priority: 0,
    }
}

async fn insert_pending(repo: &JobRepository) -> Job {
    let job = Job::new(job_input(), Utc::now()).unwrap();
    repo.insert(job).await.unwrap()
}

#[sqlx::test(migrations = "./migrations")]
async fn lock_job_is_exclusive_to_one_caller(pool: PgPool) {
    let repo = JobRepository::new(scheduler_store_postgres::Conn::pool(pool.clone()));
    let job = insert_pending(&repo).await;

    repo.lock_job(job.id, "dispatcher-a", 300).await.unwrap();

    let err = repo.lock_job(job.id, "dispatcher-b", 300).await.unwrap_err();
    assert!(matches!(err, SchedulerError::GuardMismatch(_)));
}

#[sqlx::test(migrations = "./migrations")]
async fn lock_job_succeeds_again_once_the_lease_expires(pool: PgPool) {
    let repo = JobRepository::new(scheduler_store_postgres::Conn::pool(pool.clone()));
    let job = insert_pending(&repo).await;

    repo.lock_job(job.id, "dispatcher-a", 300).await.unwrap();

    // A zero-second TTL treats any existing lock as already stale.
    repo.lock_job(job.id, "dispatcher-b", 0).await.unwrap();

    let reloaded = repo.get_one(JobFilter { id: Some(job.id), ..Default::default() }).await.unwrap();
    assert_eq!(reloaded.locked_by.as_deref(), Some("dispatcher-b"));
}

#[sqlx::test(migrations = "./migrations")]
async fn mark_running_rejects_a_job_that_is_not_queued(pool: PgPool) {
    let repo = JobRepository::new(scheduler_store_postgres::Conn::pool(pool.clone()));
    let job = insert_pending(&repo).await;

    let err = repo.mark_running(job.id).await.unwrap_err();
    assert!(matches!(err, SchedulerError::GuardMismatch(_)));
}

#[sqlx::test(migrations = "./migrations")]
async fn full_lifecycle_guards_each_transition(pool: PgPool) {
    let repo = JobRepository::new(scheduler_store_postgres::Conn::pool(pool.clone()));
    let job = insert_pending(&repo).await;

    repo.mark_queued(job.id).await.unwrap();
    repo.mark_running(job.id).await.unwrap();
    repo.mark_completed(job.id).await.unwrap();

    let completed = repo.get_one(JobFilter { id: Some(job.id), ..Default::default() }).await.unwrap();
    assert_eq!(completed.status, JobStatus::Completed);
    assert!(completed.completed_at.is_some());
    assert!(completed.locked_at.is_none(), "completing a job releases its lock");

    // Completed is terminal: re-completing must not silently succeed.
    let err = repo.mark_completed(job.id).await.unwrap_err();
    assert!(matches!(err, SchedulerError::GuardMismatch(_)));
}

#[sqlx::test(migrations = "./migrations")]
async fn mark_dead_accepts_failed_or_running_but_not_pending(pool: PgPool) {
    let repo = JobRepository::new(scheduler_store_postgres::Conn::pool(pool.clone()));
    let job = insert_pending(&repo).await;

    let err = repo.mark_dead(job.id, "never ran").await.unwrap_err();
    assert!(matches!(err, SchedulerError::GuardMismatch(_)));

    repo.mark_queued(job.id).await.unwrap();
    repo.mark_running(job.id).await.unwrap();
    repo.mark_failed(job.id, "boom", Some(500)).await.unwrap();
    repo.mark_dead(job.id, "retry budget exhausted").await.unwrap();

    let dead = repo.get_one(JobFilter { id: Some(job.id), ..Default::default() }).await.unwrap();
    assert_eq!(dead.status, JobStatus::Dead);
}

#[sqlx::test(migrations = "./migrations")]
async fn get_orders_by_priority_then_schedule_then_creation(pool: PgPool) {
    let repo = JobRepository::new(scheduler_store_postgres::Conn::pool(pool.clone()));

    let low = repo.insert(Job::new(job_input(), Utc::now()).unwrap()).await.unwrap();
    let high =
        repo.insert(Job::new(CreateJobInput { priority: 10, ..job_input() }, Utc::now()).unwrap()).await.unwrap();

    let jobs = repo
        .get(JobFilter { status: Some(JobStatus::Pending), ..Default::default() })
        .await
        .unwrap();

    let high_pos = jobs.iter().position(|j| j.id == high.id).unwrap();
    let low_pos = jobs.iter().position(|j| j.id == low.id).unwrap();
    assert!(high_pos < low_pos, "higher-priority job should sort first");
}
