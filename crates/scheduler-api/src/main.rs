use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use envconfig::Envconfig;
use sqlx::postgres::PgPoolOptions;

use scheduler_broker_rabbitmq::RabbitBroker;
use scheduler_config::{ApiConfig, BrokerConfig, DbConfig};
use scheduler_core::Coordinator;
use scheduler_executor_http::HttpExecutor;
use scheduler_outbox::Outbox;
use scheduler_store_postgres::PgUnitOfWork;

mod handlers;
mod metrics;
mod state;

async fn listen(app: Router, bind: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&bind).await.context("binding admission API socket")?;
    tracing::info!(bind = %bind, "scheduler-api listening");
    axum::serve(listener, app).await.context("serving admission API")
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    scheduler_config::load_dotenv();

    if let Err(err) = run().await {
        tracing::error!(error = %err, "scheduler-api exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let db_config = DbConfig::init_from_env().context("loading database configuration")?;
    let broker_config = BrokerConfig::init_from_env().context("loading broker configuration")?;
    let api_config = ApiConfig::init_from_env().context("loading API configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(db_config.max_connections)
        .connect(&db_config.connection_string())
        .await
        .context("connecting to Postgres")?;

    let broker = RabbitBroker::connect(&broker_config.url, broker_config.queue.clone())
        .await
        .context("connecting to RabbitMQ")?;

    let store = Arc::new(PgUnitOfWork::new(pool));
    let coordinator = Arc::new(Coordinator::new(
        store,
        Arc::new(broker),
        Arc::new(HttpExecutor::new()),
        Arc::new(Outbox::new()),
    ));

    let app = metrics::layer(handlers::router(coordinator));

    listen(app, api_config.bind()).await
}
