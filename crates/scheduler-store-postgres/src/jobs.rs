use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Postgres, QueryBuilder, Row};
use uuid::Uuid;

use scheduler_domain::{Job, JobFilter, JobStatus, JobStore, Result, SchedulerError, DEFAULT_LOCK_TTL_SECONDS};

use crate::conn::map_sqlx_err;
use crate::Conn;

pub struct JobRepository {
    conn: Conn,
}

impl JobRepository {
    pub fn new(conn: Conn) -> Self {
        Self { conn }
    }

    fn push_filter<'a>(qb: &mut QueryBuilder<'a, Postgres>, filter: &'a JobFilter, now: chrono::DateTime<Utc>) {
        if let Some(id) = filter.id {
            qb.push(" AND id = ").push_bind(id);
        }
        if let Some(job_type) = &filter.job_type {
            qb.push(" AND job_type = ").push_bind(job_type);
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status_str(status));
        }
        if filter.ready_to_run == Some(true) {
            qb.push(" AND (scheduled_at IS NULL OR scheduled_at <= ").push_bind(now).push(")");
        }
        if filter.lock_free == Some(true) {
            let ttl = filter.lock_timeout_seconds.unwrap_or(DEFAULT_LOCK_TTL_SECONDS);
            let cutoff = now - chrono::Duration::seconds(ttl);
            qb.push(" AND (locked_at IS NULL OR locked_at < ").push_bind(cutoff).push(")");
        }
    }

    fn order_and_limit(qb: &mut QueryBuilder<'_, Postgres>, filter: &JobFilter) {
        qb.push(" ORDER BY priority DESC, scheduled_at ASC NULLS FIRST, created_at ASC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }
    }
}

const SELECT_COLUMNS: &str = "id, job_type, callback_url, payload, status, max_retries, \
    scheduled_at, locked_at, locked_by, completed_at, priority, created_at, updated_at";

fn status_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Queued => "queued",
        JobStatus::Running => "running",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
        JobStatus::Dead => "dead",
        JobStatus::Disabled => "disabled",
    }
}

fn parse_status(s: &str) -> JobStatus {
    match s {
        "pending" => JobStatus::Pending,
        "queued" => JobStatus::Queued,
        "running" => JobStatus::Running,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        "dead" => JobStatus::Dead,
        "disabled" => JobStatus::Disabled,
        other => unreachable!("unknown job status in storage: {other}"),
    }
}

fn row_to_job(row: sqlx::postgres::PgRow) -> Job {
    Job {
        id: row.get("id"),
        job_type: row.get("job_type"),
        callback_url: row.get("callback_url"),
        payload: row.get("payload"),
        status: parse_status(row.get::<String, _>("status").as_str()),
        max_retries: row.get("max_retries"),
        scheduled_at: row.get("scheduled_at"),
        locked_at: row.get("locked_at"),
        locked_by: row.get("locked_by"),
        completed_at: row.get("completed_at"),
        priority: row.get("priority"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl JobStore for JobRepository {
    async fn insert(&self, job: Job) -> Result<Job> {
        let query = format!(
            "INSERT INTO jobs ({SELECT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        );
        let result = sqlx::query(&query)
            .bind(job.id)
            .bind(&job.job_type)
            .bind(&job.callback_url)
            .bind(&job.payload)
            .bind(status_str(job.status))
            .bind(job.max_retries)
            .bind(job.scheduled_at)
            .bind(job.locked_at)
            .bind(&job.locked_by)
            .bind(job.completed_at)
            .bind(job.priority)
            .bind(job.created_at)
            .bind(job.updated_at);

        match &self.conn {
            Conn::Pool(pool) => result.execute(pool).await,
            Conn::Tx(tx) => {
                let mut guard = tx.lock().await;
                result.execute(&mut **guard).await
            }
        }
        .map_err(map_sqlx_err)?;

        Ok(job)
    }

    async fn get_one(&self, filter: JobFilter) -> Result<Job> {
        let now = Utc::now();
        let mut qb = QueryBuilder::new(format!("SELECT {SELECT_COLUMNS} FROM jobs WHERE 1=1"));
        Self::push_filter(&mut qb, &filter, now);
        let query = qb.build();

        let row = match &self.conn {
            Conn::Pool(pool) => query.fetch_optional(pool).await,
            Conn::Tx(tx) => {
                let mut guard = tx.lock().await;
                query.fetch_optional(&mut **guard).await
            }
        }
        .map_err(map_sqlx_err)?;

        row.map(row_to_job).ok_or(SchedulerError::NotFound)
    }

    async fn get(&self, filter: JobFilter) -> Result<Vec<Job>> {
        let now = Utc::now();
        let mut qb = QueryBuilder::new(format!("SELECT {SELECT_COLUMNS} FROM jobs WHERE 1=1"));
        Self::push_filter(&mut qb, &filter, now);
        Self::order_and_limit(&mut qb, &filter);
        let query = qb.build();

        let rows = match &self.conn {
            Conn::Pool(pool) => query.fetch_all(pool).await,
            Conn::Tx(tx) => {
                let mut guard = tx.lock().await;
                query.fetch_all(&mut **guard).await
            }
        }
        .map_err(map_sqlx_err)?;

        Ok(rows.into_iter().map(row_to_job).collect())
    }

    async fn lock_job(&self, id: Uuid, owner: &str, lock_ttl_seconds: i64) -> Result<()> {
        let cutoff = Utc::now() - chrono::Duration::seconds(lock_ttl_seconds);
        let query = sqlx::query(
            "UPDATE jobs SET locked_at = NOW(), locked_by = $1, updated_at = NOW() \
             WHERE id = $2 AND status = 'pending' AND (locked_at IS NULL OR locked_at < $3)",
        )
        .bind(owner)
        .bind(id)
        .bind(cutoff);

        let result = match &self.conn {
            Conn::Pool(pool) => query.execute(pool).await,
            Conn::Tx(tx) => {
                let mut guard = tx.lock().await;
                query.execute(&mut **guard).await
            }
        }
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::GuardMismatch(format!(
                "job {id} is not pending or its lock is still held"
            )));
        }
        Ok(())
    }

    async fn mark_queued(&self, id: Uuid) -> Result<()> {
        self.guarded_status_update(id, "pending", "queued", &[]).await
    }

    async fn mark_running(&self, id: Uuid) -> Result<()> {
        self.guarded_status_update(id, "queued", "running", &[]).await
    }

    async fn mark_completed(&self, id: Uuid) -> Result<()> {
        let query = sqlx::query(
            "UPDATE jobs SET status = 'completed', completed_at = NOW(), \
             locked_at = NULL, locked_by = NULL, updated_at = NOW() \
             WHERE id = $1 AND status = 'running'",
        )
        .bind(id);
        self.execute_guarded(query, id).await
    }

    async fn mark_failed(&self, id: Uuid, err_msg: &str, http_status: Option<i32>) -> Result<()> {
        tracing::debug!(job_id = %id, error = err_msg, http_status, "marking job failed");
        let query = sqlx::query(
            "UPDATE jobs SET status = 'failed', locked_at = NULL, locked_by = NULL, updated_at = NOW() \
             WHERE id = $1 AND status = 'running'",
        )
        .bind(id);
        self.execute_guarded(query, id).await
    }

    async fn mark_dead(&self, id: Uuid, reason: &str) -> Result<()> {
        tracing::debug!(job_id = %id, reason, "moving job to dead letter");
        let query = sqlx::query(
            "UPDATE jobs SET status = 'dead', updated_at = NOW() \
             WHERE id = $1 AND status IN ('failed', 'running')",
        )
        .bind(id);
        self.execute_guarded(query, id).await
    }
}

impl JobRepository {
    async fn guarded_status_update(&self, id: Uuid, from: &str, to: &str, _extra: &[()]) -> Result<()> {
        let query = sqlx::query("UPDATE jobs SET status = $1, updated_at = NOW() WHERE id = $2 AND status = $3")
            .bind(to)
            .bind(id)
            .bind(from);
        self.execute_guarded(query, id).await
    }

    async fn execute_guarded<'q>(
        &self,
        query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
        id: Uuid,
    ) -> Result<()> {
        let result = match &self.conn {
            Conn::Pool(pool) => query.execute(pool).await,
            Conn::Tx(tx) => {
                let mut guard = tx.lock().await;
                query.execute(&mut **guard).await
            }
        }
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::GuardMismatch(format!(
                "job {id} was not in the expected prior status"
            )));
        }
        Ok(())
    }
}
