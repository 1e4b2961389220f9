//! PostgreSQL implementation of the job scheduler's store traits.
//!
//! This crate provides the production persistence layer: guarded
//! compare-and-set status transitions, a lock-lease based dispatcher
//! CAS, and a reentrant `Atomic` unit of work built on `sqlx`'s
//! transaction handle.
//!
//! # Database schema
//!
//! ```sql
//! CREATE TABLE jobs (
//!     id            UUID PRIMARY KEY,
//!     job_type      TEXT NOT NULL,
//!     callback_url  TEXT NOT NULL,
//!     payload       JSONB NOT NULL,
//!     status        TEXT NOT NULL,
//!     max_retries   INTEGER NOT NULL,
//!     scheduled_at  TIMESTAMPTZ,
//!     locked_at     TIMESTAMPTZ,
//!     locked_by     TEXT,
//!     completed_at  TIMESTAMPTZ,
//!     priority      INTEGER NOT NULL DEFAULT 0,
//!     created_at    TIMESTAMPTZ NOT NULL,
//!     updated_at    TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE INDEX idx_jobs_dispatch ON jobs (priority DESC, scheduled_at, created_at)
//!     WHERE status = 'pending';
//!
//! CREATE TABLE job_attempts (
//!     id             BIGSERIAL PRIMARY KEY,
//!     job_id         UUID NOT NULL REFERENCES jobs(id),
//!     attempt_number INTEGER NOT NULL,
//!     started_at     TIMESTAMPTZ NOT NULL,
//!     status         TEXT NOT NULL,
//!     error_message  TEXT,
//!     http_status    INTEGER,
//!     created_at     TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE events (
//!     id         BIGSERIAL PRIMARY KEY,
//!     job_id     UUID NOT NULL REFERENCES jobs(id),
//!     event_type TEXT NOT NULL,
//!     message    TEXT NOT NULL,
//!     metadata   JSONB,
//!     created_at TIMESTAMPTZ NOT NULL
//! );
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use scheduler_store_postgres::PgUnitOfWork;
//! use sqlx::PgPool;
//!
//! let pool = PgPool::connect("postgres://localhost/scheduler").await?;
//! let uow = PgUnitOfWork::new(pool);
//! ```

mod conn;
mod jobs;
mod attempts;
mod events;
mod uow;

pub use jobs::JobRepository;
pub use attempts::AttemptRepository;
pub use events::EventRepository;
pub use uow::PgUnitOfWork;
pub use conn::Conn;
