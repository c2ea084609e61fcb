use anyhow::{Context, Result};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::{Message, Offset, TopicPartitionList};

use super::{InboundMessage, MessageSource};
use crate::config::{ConsumerConfig, KafkaConfig};

/// Consumer-group member reading the orders topic.
///
/// Auto-commit is off: offsets advance only through `acknowledge`, which the
/// consumer loop calls once a message reached a terminal outcome.
pub struct KafkaMessageSource {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaMessageSource {
    pub fn new(kafka: &KafkaConfig, consumer: &ConsumerConfig) -> Result<Self> {
        let stream: StreamConsumer = client_config(kafka, consumer)
            .create()
            .context("Failed to create Kafka consumer")?;

        stream
            .subscribe(&[kafka.topic.as_str()])
            .with_context(|| format!("Failed to subscribe to topic {}", kafka.topic))?;

        tracing::info!(
            brokers = %kafka.brokers.join(","),
            topic = %kafka.topic,
            group_id = %kafka.group_id,
            "📡 Kafka consumer subscribed"
        );

        Ok(Self {
            consumer: stream,
            topic: kafka.topic.clone(),
        })
    }
}

fn client_config(kafka: &KafkaConfig, consumer: &ConsumerConfig) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", kafka.brokers.join(","))
        .set("group.id", &kafka.group_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .set("session.timeout.ms", "6000")
        .set("enable.partition.eof", "false")
        .set("fetch.min.bytes", consumer.min_bytes.to_string())
        .set("fetch.max.bytes", consumer.max_bytes.to_string())
        .set("fetch.wait.max.ms", consumer.max_wait.as_millis().to_string());
    config
}

#[async_trait]
impl MessageSource for KafkaMessageSource {
    async fn fetch(&self) -> Result<InboundMessage> {
        let message = self
            .consumer
            .recv()
            .await
            .context("Failed to receive message from Kafka")?;

        Ok(InboundMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message
                .key()
                .map(|k| String::from_utf8_lossy(k).into_owned()),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        })
    }

    async fn acknowledge(&self, message: &InboundMessage) -> Result<()> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                &message.topic,
                message.partition,
                Offset::Offset(message.offset + 1),
            )
            .context("Failed to build offset list")?;

        self.consumer
            .commit(&offsets, CommitMode::Async)
            .with_context(|| {
                format!(
                    "Failed to commit offset {} on {}/{}",
                    message.offset, self.topic, message.partition
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::fixtures::consumer_config;

    #[test]
    fn test_client_config_disables_auto_commit() {
        let kafka = KafkaConfig {
            brokers: vec!["kafka-1:9092".to_string(), "kafka-2:9092".to_string()],
            topic: "orders".to_string(),
            group_id: "order-service".to_string(),
        };

        let config = client_config(&kafka, &consumer_config());

        assert_eq!(config.get("bootstrap.servers"), Some("kafka-1:9092,kafka-2:9092"));
        assert_eq!(config.get("group.id"), Some("order-service"));
        assert_eq!(config.get("enable.auto.commit"), Some("false"));
        assert_eq!(config.get("auto.offset.reset"), Some("earliest"));
        assert_eq!(config.get("fetch.min.bytes"), Some("1"));
        assert_eq!(config.get("fetch.max.bytes"), Some("1024"));
        assert_eq!(config.get("fetch.wait.max.ms"), Some("100"));
    }
}
