// ============================================================================
// Messaging
// ============================================================================
//
// `MessageSource` is the seam between the consumer loop and the broker.
// The Redpanda/Kafka implementation lives in redpanda.rs; tests drive the
// loop with a scripted source instead.
//
// ============================================================================

mod redpanda;

#[cfg(test)]
pub(crate) mod scripted;

use async_trait::async_trait;

pub use redpanda::KafkaMessageSource;

/// One message pulled from the queue, detached from the client's buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Wait for the next message.
    async fn fetch(&self) -> anyhow::Result<InboundMessage>;

    /// Mark `message` as consumed so it is not redelivered to the group.
    async fn acknowledge(&self, message: &InboundMessage) -> anyhow::Result<()>;
}
