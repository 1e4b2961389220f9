use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use scheduler_domain::{Broker, BrokerMessage, MessageHandler, Result};

/// In-memory broker: `publish` appends to a shared log instead of
/// handing the message to a real queue. `consume` is a no-op since
/// tests drive delivery directly by calling the handler, mirroring how
/// `scheduler-worker` would invoke it per message.
#[derive(Default)]
pub struct RecordingBroker {
    published: Mutex<Vec<BrokerMessage>>,
}

impl RecordingBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn published(&self) -> Vec<BrokerMessage> {
        self.published.lock().await.clone()
    }

    pub async fn take_last(&self) -> Option<BrokerMessage> {
        self.published.lock().await.last().cloned()
    }
}

#[async_trait]
impl Broker for RecordingBroker {
    async fn publish(&self, message: &BrokerMessage) -> Result<()> {
        self.published.lock().await.push(message.clone());
        Ok(())
    }

    async fn consume(&self, _handler: Arc<dyn MessageHandler>) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
