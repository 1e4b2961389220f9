use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use envconfig::Envconfig;
use sqlx::postgres::PgPoolOptions;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

use scheduler_broker_rabbitmq::RabbitBroker;
use scheduler_config::{BrokerConfig, DbConfig, WorkerConfig};
use scheduler_core::Coordinator;
use scheduler_domain::{Broker, BrokerMessage, MessageHandler};
use scheduler_executor_http::HttpExecutor;
use scheduler_outbox::Outbox;
use scheduler_store_postgres::PgUnitOfWork;

/// Bridges `Broker::consume`'s fire-and-forget delivery callback to the
/// coordinator, logging (never propagating) per-message failures so one
/// bad delivery never stops the consumer loop. `shutdown` is the
/// ambient cancellation context: on SIGINT/SIGTERM any in-flight
/// callback is cancelled rather than left to run to completion.
struct JobMessageHandler {
    coordinator: Arc<Coordinator>,
    shutdown: CancellationToken,
}

#[async_trait]
impl MessageHandler for JobMessageHandler {
    async fn handle(&self, msg: BrokerMessage) {
        let job_id = msg.job_id;
        if let Err(err) = self.coordinator.process_job_message(msg, self.shutdown.clone()).await {
            tracing::error!(job_id = %job_id, error = %err, "failed processing job");
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    scheduler_config::load_dotenv();

    if let Err(err) = run().await {
        tracing::error!(error = %err, "scheduler-worker exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let db_config = DbConfig::init_from_env().context("loading database configuration")?;
    let broker_config = BrokerConfig::init_from_env().context("loading broker configuration")?;
    let worker_config = WorkerConfig::init_from_env().context("loading worker configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(db_config.max_connections)
        .connect(&db_config.connection_string())
        .await
        .context("connecting to Postgres")?;

    let broker = Arc::new(
        RabbitBroker::connect(&broker_config.url, broker_config.queue.clone())
            .await
            .context("connecting to RabbitMQ")?,
    );

    let store = Arc::new(PgUnitOfWork::new(pool));
    let coordinator = Arc::new(Coordinator::new(
        store,
        broker.clone(),
        Arc::new(HttpExecutor::new()),
        Arc::new(Outbox::new()),
    ));

    tracing::info!(instance_id = %worker_config.instance_id, "scheduler-worker listening for jobs");

    let shutdown = CancellationToken::new();
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT, cancelling in-flight callbacks"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, cancelling in-flight callbacks"),
        }
        signal_shutdown.cancel();
    });

    let handler = Arc::new(JobMessageHandler { coordinator, shutdown });
    broker.consume(handler).await.context("consumer loop stopped")
}
