use std::sync::Arc;

use anyhow::{Context, Result};
use envconfig::Envconfig;
use sqlx::postgres::PgPoolOptions;
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::{interval, Duration};

use scheduler_broker_rabbitmq::RabbitBroker;
use scheduler_config::{BrokerConfig, DbConfig, DispatcherConfig};
use scheduler_dispatcher::run_tick;
use scheduler_domain::{Broker, Store};
use scheduler_store_postgres::PgUnitOfWork;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    scheduler_config::load_dotenv();

    if let Err(err) = run().await {
        tracing::error!(error = %err, "scheduler-dispatcher exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let db_config = DbConfig::init_from_env().context("loading database configuration")?;
    let broker_config = BrokerConfig::init_from_env().context("loading broker configuration")?;
    let dispatcher_config = DispatcherConfig::init_from_env().context("loading dispatcher configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(db_config.max_connections)
        .connect(&db_config.connection_string())
        .await
        .context("connecting to Postgres")?;

    let broker: Arc<dyn Broker> = Arc::new(
        RabbitBroker::connect(&broker_config.url, broker_config.queue.clone())
            .await
            .context("connecting to RabbitMQ")?,
    );

    let store: Arc<dyn Store> = Arc::new(PgUnitOfWork::new(pool));

    tracing::info!(
        instance_id = %dispatcher_config.instance_id,
        interval_ms = dispatcher_config.interval_ms,
        batch_size = dispatcher_config.batch_size,
        "scheduler-dispatcher starting"
    );

    let mut ticker = interval(Duration::from_millis(dispatcher_config.interval_ms));
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match run_tick(
                    &store,
                    &broker,
                    &dispatcher_config.instance_id,
                    dispatcher_config.lock_ttl_seconds,
                    dispatcher_config.batch_size,
                )
                .await
                {
                    Ok(dispatched) if dispatched > 0 => {
                        tracing::info!(dispatched, "dispatch tick complete");
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!(error = %err, "dispatch tick failed, retrying next interval"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                break;
            }
        }
    }

    Ok(())
}
