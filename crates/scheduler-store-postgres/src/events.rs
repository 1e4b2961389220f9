use async_trait::async_trait;
use sqlx::Row;

use scheduler_domain::{Event, EventFilter, EventStore, EventType, NewEvent, Result};

use crate::conn::map_sqlx_err;
use crate::Conn;

pub struct EventRepository {
    conn: Conn,
}

impl EventRepository {
    pub fn new(conn: Conn) -> Self {
        Self { conn }
    }
}

fn type_str(t: EventType) -> &'static str {
    match t {
        EventType::JobCreated => "job_created",
        EventType::JobQueued => "job_queued",
        EventType::JobRunning => "job_running",
        EventType::JobSucceeded => "job_succeeded",
        EventType::JobFailed => "job_failed",
        EventType::JobDead => "job_dead",
    }
}

fn parse_type(s: &str) -> EventType {
    match s {
        "job_created" => EventType::JobCreated,
        "job_queued" => EventType::JobQueued,
        "job_running" => EventType::JobRunning,
        "job_succeeded" => EventType::JobSucceeded,
        "job_failed" => EventType::JobFailed,
        "job_dead" => EventType::JobDead,
        other => unreachable!("unknown event type in storage: {other}"),
    }
}

fn row_to_event(row: sqlx::postgres::PgRow) -> Event {
    Event {
        id: row.get("id"),
        job_id: row.get("job_id"),
        event_type: parse_type(row.get::<String, _>("event_type").as_str()),
        message: row.get("message"),
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl EventStore for EventRepository {
    async fn insert(&self, event: NewEvent) -> Result<Event> {
        let created_at = chrono::Utc::now();
        let query = sqlx::query(
            "INSERT INTO events (job_id, event_type, message, metadata, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, job_id, event_type, message, metadata, created_at",
        )
        .bind(event.job_id)
        .bind(type_str(event.event_type))
        .bind(&event.message)
        .bind(&event.metadata)
        .bind(created_at);

        let row = match &self.conn {
            Conn::Pool(pool) => query.fetch_one(pool).await,
            Conn::Tx(tx) => {
                let mut guard = tx.lock().await;
                query.fetch_one(&mut **guard).await
            }
        }
        .map_err(map_sqlx_err)?;

        Ok(row_to_event(row))
    }

    async fn get(&self, filter: EventFilter) -> Result<Vec<Event>> {
        let mut query = String::from(
            "SELECT id, job_id, event_type, message, metadata, created_at FROM events WHERE 1=1",
        );
        if filter.job_id.is_some() {
            query.push_str(" AND job_id = $1");
        }
        query.push_str(" ORDER BY created_at ASC");

        let mut q = sqlx::query(&query);
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

        Ok(rows.into_iter().map(row_to_event).collect())
    }
}
