//! Broker gateway contract: publish/consume of job messages on a
//! durable queue. The broker is assumed durable with at-least-once
//! delivery to consumers; the coordinator's idempotency gate tolerates
//! redelivery (see `scheduler-core`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;

/// Wire format of a dispatched job, matching §6's JSON contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerMessage {
    pub job_id: Uuid,
    #[serde(rename = "type")]
    pub job_type: String,
    pub callback_url: String,
    pub payload: Value,
    /// 1-based delivery number.
    pub attempt: i32,
}

impl BrokerMessage {
    pub fn with_incremented_attempt(&self) -> BrokerMessage {
        BrokerMessage {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}

/// A handler invoked synchronously per decoded delivery.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, msg: BrokerMessage);
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Enqueue a single message; returns only after the broker
    /// acknowledges the publish.
    async fn publish(&self, msg: &BrokerMessage) -> Result<()>;

    /// Start a blocking consumer that decodes each message body and
    /// invokes `handler` synchronously. Undecodable messages are
    /// dropped (logged, not requeued). Runs until cancelled.
    async fn consume(&self, handler: std::sync::Arc<dyn MessageHandler>) -> Result<()>;

    /// Idempotent shutdown.
    async fn close(&self) -> Result<()>;
}
