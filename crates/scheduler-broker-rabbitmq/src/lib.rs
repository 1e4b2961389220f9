//! RabbitMQ gateway implementing [`scheduler_domain::Broker`].
//!
//! Messages are published to a single durable queue and consumed with
//! `no_ack: true` (auto-ack). Durability of scheduling state lives in
//! Postgres, not in the broker, so losing an unacked message on a
//! worker crash is recovered by the dispatcher's lock-expiry sweep
//! rather than by broker redelivery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Connection, ConnectionProperties, Channel};

use scheduler_domain::{Broker, BrokerMessage, MessageHandler, Result, SchedulerError};

pub struct RabbitBroker {
    queue_name: String,
    channel: Channel,
    _connection: Connection,
    closed: AtomicBool,
}

impl RabbitBroker {
    pub async fn connect(amqp_url: &str, queue_name: impl Into<String>) -> Result<Self> {
        let connection = Connection::connect(amqp_url, ConnectionProperties::default())
            .await
            .map_err(|e| SchedulerError::transient(e))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| SchedulerError::transient(e))?;

        let queue_name = queue_name.into();
        channel
            .queue_declare(
                &queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| SchedulerError::transient(e))?;

        Ok(Self {
            queue_name,
            channel,
            _connection: connection,
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Broker for RabbitBroker {
    async fn publish(&self, message: &BrokerMessage) -> Result<()> {
        let body = serde_json::to_vec(message)
            .map_err(|e| SchedulerError::Serialization(e.into()))?;

        self.channel
            .basic_publish(
                "",
                &self.queue_name,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await
            .map_err(|e| SchedulerError::transient(e))?
            .await
            .map_err(|e| SchedulerError::transient(e))?;

        Ok(())
    }

    async fn consume(&self, handler: Arc<dyn MessageHandler>) -> Result<()> {
        let mut consumer = self
            .channel
            .basic_consume(
                &self.queue_name,
                "scheduler-worker",
                BasicConsumeOptions {
                    no_ack: true,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| SchedulerError::transient(e))?;

        while let Some(delivery) = consumer.next().await {
            let delivery = match delivery {
                Ok(d) => d,
                Err(err) => {
                    tracing::warn!(error = %err, "delivery error from broker, skipping");
                    continue;
                }
            };

            match serde_json::from_slice::<BrokerMessage>(&delivery.data) {
                Ok(message) => handler.handle(message).await,
                Err(err) => {
                    tracing::error!(error = %err, "dropping undecodable broker message");
                }
            }
        }

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // Idempotent: a second call is a no-op rather than an error,
        // since shutdown paths may race and call close() more than once.
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.channel
            .close(200, "closed")
            .await
            .map_err(|e| SchedulerError::transient(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_message_round_trips_through_json() {
        let message = BrokerMessage {
            job_id: uuid::Uuid::new_v4(),
            job_type: "http_callback".to_string(),
            callback_url: "https://example.com/hook".to_string(),
            payload: serde_json::json!({"k": "v"}),
            attempt: 1,
        };
        let body = serde_json::to_vec(&message).unwrap();
        let decoded: BrokerMessage = serde_json::from_slice(&body).unwrap();
        assert_eq!(decoded.job_id, message.job_id);
        assert_eq!(decoded.job_type, "http_callback");
    }
}
