use std::sync::Arc;

use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::Mutex;

use scheduler_domain::SchedulerError;

/// Either a direct pool connection or a handle into an in-flight
/// transaction. Mirrors the original `pgx.Tx`-or-`nil` dispatch in each
/// repository method, generalized to Rust's borrow-checked transaction
/// handle: a transaction must be exclusively borrowed per query, so an
/// active one is shared behind a mutex rather than a bare pointer.
#[derive(Clone)]
pub enum Conn {
    Pool(PgPool),
    Tx(Arc<Mutex<Transaction<'static, Postgres>>>),
}

impl Conn {
    pub fn pool(pool: PgPool) -> Self {
        Conn::Pool(pool)
    }

    pub fn tx(tx: Arc<Mutex<Transaction<'static, Postgres>>>) -> Self {
        Conn::Tx(tx)
    }
}

pub(crate) fn map_sqlx_err(err: sqlx::Error) -> SchedulerError {
    match err {
        sqlx::Error::RowNotFound => SchedulerError::NotFound,
        other => SchedulerError::transient(other),
    }
}
