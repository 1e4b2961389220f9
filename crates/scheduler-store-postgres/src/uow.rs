use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::Mutex;

use scheduler_domain::{Atomic, AtomicOutcome, AtomicResult, AttemptStore, EventStore, JobStore, Result, SchedulerError, UnitOfWork};

use crate::attempts::AttemptRepository;
use crate::conn::map_sqlx_err;
use crate::events::EventRepository;
use crate::jobs::JobRepository;
use crate::Conn;

/// Postgres-backed unit of work. A fresh instance wraps a bare pool
/// connection; `atomic` reentrantly produces a transaction-bound
/// instance that `f` receives as its `&dyn UnitOfWork`. The three
/// repositories are constructed once per instance and borrowed out,
/// rather than rebuilt per call.
pub struct PgUnitOfWork {
    conn: Conn,
    jobs: JobRepository,
    attempts: AttemptRepository,
    events: EventRepository,
}

impl PgUnitOfWork {
    pub fn new(pool: PgPool) -> Self {
        Self::from_conn(Conn::pool(pool))
    }

    fn from_conn(conn: Conn) -> Self {
        Self {
            jobs: JobRepository::new(conn.clone()),
            attempts: AttemptRepository::new(conn.clone()),
            events: EventRepository::new(conn.clone()),
            conn,
        }
    }
}

impl UnitOfWork for PgUnitOfWork {
    fn jobs(&self) -> &dyn JobStore {
        &self.jobs
    }

    fn attempts(&self) -> &dyn AttemptStore {
        &self.attempts
    }

    fn events(&self) -> &dyn EventStore {
        &self.events
    }
}

#[async_trait::async_trait]
impl Atomic for PgUnitOfWork {
    async fn atomic(
        &self,
        f: Box<dyn for<'c> FnOnce(&'c dyn UnitOfWork) -> AtomicResult<'c, AtomicOutcome> + Send + '_>,
    ) -> Result<AtomicOutcome> {
        if let Conn::Tx(_) = &self.conn {
            tracing::trace!("reusing in-flight transaction for nested atomic()");
            return f(self).await;
        }

        let Conn::Pool(pool) = &self.conn else { unreachable!() };
        tracing::trace!("beginning new transaction");
        let tx = pool.begin().await.map_err(map_sqlx_err)?;
        let tx = Arc::new(Mutex::new(tx));
        let tx_view = PgUnitOfWork::from_conn(Conn::tx(tx.clone()));

        let outcome = f(&tx_view).await;

        let tx = Arc::try_unwrap(tx)
            .map_err(|_| SchedulerError::transient(anyhow::anyhow!("transaction handle still referenced at commit time")))?
            .into_inner();

        match outcome {
            Ok(value) => {
                tx.commit().await.map_err(map_sqlx_err)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    return Err(SchedulerError::transient(anyhow::anyhow!(
                        "transaction error: {err}; rollback also failed: {rollback_err}"
                    )));
                }
                Err(err)
            }
        }
    }
}
