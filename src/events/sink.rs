use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use rskafka::client::partition::{Compression, PartitionClient, UnknownTopicHandling};
use rskafka::client::ClientBuilder;
use rskafka::record::Record;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::events::types::{EventEnvelope, Notification};
use crate::models::OutboxEvent;

/// Delivery target for committed notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, event: &OutboxEvent) -> Result<()>;

    fn name(&self) -> &'static str;

    /// False while a remote sink has not yet reached its broker.
    fn is_connected(&self) -> bool {
        true
    }
}

/// Writes notifications to the log. Used when no broker is configured.
#[derive(Debug, Default, Clone)]
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn deliver(&self, event: &OutboxEvent) -> Result<()> {
        info!(
            event_id = %event.id,
            recipient_id = %event.recipient_id,
            event_type = event.event_type.as_str(),
            title = %event.title,
            "Notification dispatched"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}

#[derive(Debug, Clone)]
pub struct KafkaSinkConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
}

impl KafkaSinkConfig {
    pub fn new(brokers: Vec<String>, topic: impl Into<String>) -> Self {
        Self {
            brokers,
            topic: topic.into(),
            retry_count: 3,
            retry_delay_ms: 100,
        }
    }
}

/// Publishes notifications as JSON envelopes keyed by recipient.
///
/// The broker connection is established lazily on first delivery so the
/// service can start while Kafka is unavailable.
pub struct KafkaNotificationSink {
    config: KafkaSinkConfig,
    partition: OnceCell<Arc<PartitionClient>>,
}

impl KafkaNotificationSink {
    pub fn new(config: KafkaSinkConfig) -> Self {
        Self {
            config,
            partition: OnceCell::new(),
        }
    }

    async fn partition_client(&self) -> Result<Arc<PartitionClient>> {
        self.partition
            .get_or_try_init(|| async {
                info!("Connecting to Kafka brokers: {:?}", self.config.brokers);
                let client = ClientBuilder::new(self.config.brokers.clone())
                    .build()
                    .await
                    .map_err(|e| AppError::Internal(anyhow!("Failed to connect to Kafka: {}", e)))?;

                let partition = client
                    .partition_client(self.config.topic.clone(), 0, UnknownTopicHandling::Retry)
                    .await
                    .map_err(|e| AppError::Internal(anyhow!("Failed to get partition client: {}", e)))?;
                Ok::<_, AppError>(Arc::new(partition))
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl NotificationSink for KafkaNotificationSink {
    async fn deliver(&self, event: &OutboxEvent) -> Result<()> {
        let envelope = EventEnvelope::<Notification>::from(event);
        let payload = serde_json::to_vec(&envelope)
            .map_err(|e| AppError::Internal(anyhow!("Failed to serialize notification: {}", e)))?;
        let record = Record {
            key: Some(event.recipient_id.to_string().into_bytes()),
            value: Some(payload),
            headers: BTreeMap::new(),
            timestamp: Utc::now(),
        };

        let partition = self.partition_client().await?;
        let mut last_error = None;
        for attempt in 0..=self.config.retry_count {
            if attempt > 0 {
                warn!("Retrying Kafka send, attempt {}/{}", attempt, self.config.retry_count);
                tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms * attempt as u64)).await;
            }
            match partition.produce(vec![record.clone()], Compression::NoCompression).await {
                Ok(offsets) => {
                    debug!(event_id = %event.id, offset = ?offsets.first(), "Notification published");
                    return Ok(());
                }
                Err(e) => last_error = Some(e.to_string()),
            }
        }

        Err(AppError::Internal(anyhow!(
            "Failed to publish notification after {} retries: {}",
            self.config.retry_count,
            last_error.unwrap_or_default()
        )))
    }

    fn name(&self) -> &'static str {
        "kafka"
    }

    fn is_connected(&self) -> bool {
        self.partition.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kafka_sink_starts_disconnected() {
        let sink = KafkaNotificationSink::new(KafkaSinkConfig::new(
            vec!["kafka:9092".to_string()],
            "petcare.notifications",
        ));
        assert!(!sink.is_connected());
        assert_eq!(sink.config.retry_count, 3);
        assert_eq!(sink.name(), "kafka");
    }
}
