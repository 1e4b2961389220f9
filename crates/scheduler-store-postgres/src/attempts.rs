use async_trait::async_trait;
use sqlx::Row;

use scheduler_domain::{Attempt, AttemptFilter, AttemptStatus, AttemptStore, NewAttempt, Result};

use crate::conn::map_sqlx_err;
use crate::Conn;

pub struct AttemptRepository {
    conn: Conn,
}

impl AttemptRepository {
    pub fn new(conn: Conn) -> Self {
        Self { conn }
    }
}

fn status_str(status: AttemptStatus) -> &'static str {
    match status {
        AttemptStatus::Success => "success",
        AttemptStatus::Failed => "failed",
    }
}

fn parse_status(s: &str) -> AttemptStatus {
    match s {
        "success" => AttemptStatus::Success,
        "failed" => AttemptStatus::Failed,
        other => unreachable!("unknown attempt status in storage: {other}"),
    }
}

fn row_to_attempt(row: sqlx::postgres::PgRow) -> Attempt {
    Attempt {
        id: row.get("id"),
        job_id: row.get("job_id"),
        attempt_number: row.get("attempt_number"),
        started_at: row.get("started_at"),
        status: parse_status(row.get::<String, _>("status").as_str()),
        error_message: row.get("error_message"),
        http_status: row.get("http_status"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl AttemptStore for AttemptRepository {
    async fn insert(&self, attempt: NewAttempt) -> Result<Attempt> {
        let created_at = chrono::Utc::now();
        let query = sqlx::query(
            "INSERT INTO job_attempts \
             (job_id, attempt_number, started_at, status, error_message, http_status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING id, job_id, attempt_number, started_at, status, error_message, http_status, created_at",
        )
        .bind(attempt.job_id)
        .bind(attempt.attempt_number)
        .bind(attempt.started_at)
        .bind(status_str(attempt.status))
        .bind(&attempt.error_message)
        .bind(attempt.http_status)
        .bind(created_at);

        let row = match &self.conn {
            Conn::Pool(pool) => query.fetch_one(pool).await,
            Conn::Tx(tx) => {
                let mut guard = tx.lock().await;
                query.fetch_one(&mut **guard).await
            }
        }
        .map_err(map_sqlx_err)?;

        Ok(row_to_attempt(row))
    }

    async fn get(&self, filter: AttemptFilter) -> Result<Vec<Attempt>> {
        let mut query = String::from(
            "SELECT id, job_id, attempt_number, started_at, status, error_message, http_status, created_at \
             FROM job_attempts WHERE 1=1",
        );
        if filter.id.is_some() {
            query.push_str(" AND id = $1");
        }
        if filter.job_id.is_some() {
            query.push_str(if filter.id.is_some() { " AND job_id = $2" } else { " AND job_id = $1" });
        }
        query.push_str(" ORDER BY attempt_number ASC");

        let mut q = sqlx::query(&query);
        if let Some(id) = filter.id {
            q = q.bind(id);
        }
        if let Some(job_id) = filter.job_id {
            q = q.bind(job_id);
        }

        let rows = match &self.conn {
            Conn::Pool(pool) => q.fetch_all(pool).await,
            Conn::Tx(tx) => {
                let mut guard = tx.lock().await;
                q.fetch_all(&mut **guard).await
            }
        }
        .map_err(map_sqlx_err)?;

        Ok(rows.into_iter().map(row_to_attempt).collect())
    }

    async fn count(&self, filter: AttemptFilter) -> Result<i64> {
        let mut query = String::from("SELECT COUNT(*) FROM job_attempts WHERE 1=1");
        if filter.job_id.is_some() {
            query.push_str(" AND job_id = $1");
        }
        if filter.status.is_some() {
            query.push_str(if filter.job_id.is_some() { " AND status = $2" } else { " AND status = $1" });
        }

        let mut q = sqlx::query(&query);
        if let Some(job_id) = filter.job_id {
            q = q.bind(job_id);
        }
        if let Some(status) = filter.status {
            q = q.bind(status_str(status));
        }

        let row = match &self.conn {
            Conn::Pool(pool) => q.fetch_one(pool).await,
            Conn::Tx(tx) => {
                let mut guard = tx.lock().await;
                q.fetch_one(&mut **guard).await
            }
        }
        .map_err(map_sqlx_err)?;

        Ok(row.get::<i64, _>(0))
    }
}
