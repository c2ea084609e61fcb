use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ConsumerConfig;
use crate::messaging::{InboundMessage, MessageSource};
use crate::metrics::Metrics;
use crate::models::{Order, ValidationError};
use crate::store::{with_transaction, OrderStore, StoreError};

// ============================================================================
// Queue Consumer
// ============================================================================
//
// One long-lived task pulling order messages and persisting them, strictly
// one message at a time:
//
//   Idle → Running(Fetch → Decode → Validate → PersistTx) … → Stopped
//
// Fetch failures are retried after `retry_delay`. Every per-message failure
// is handled locally and the loop moves on; only cancellation stops it.
//
// Offsets: a message is acknowledged once it reaches a terminal outcome
// (persisted, or rejected because it can never succeed). Persistence
// failures and timeouts are not acknowledged, but commits are cumulative per
// partition, so the next acknowledged message on that partition moves past
// them.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Fetch,
    Decode,
    Validate,
    PersistTx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Running(Phase),
    Stopped,
}

impl std::fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsumerState::Idle => write!(f, "idle"),
            ConsumerState::Running(phase) => write!(f, "running ({:?})", phase),
            ConsumerState::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to decode order payload: {0}")]
    Decode(#[source] serde_json::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to persist order {order_uid}: {source}")]
    Persist {
        order_uid: String,
        #[source]
        source: StoreError,
    },

    #[error("message processing timed out after {0:?}")]
    Timeout(Duration),
}

impl IngestError {
    /// Terminal failures will fail the same way on redelivery.
    pub fn is_terminal(&self) -> bool {
        matches!(self, IngestError::Decode(_) | IngestError::Validation(_))
    }

    pub fn reason(&self) -> &'static str {
        match self {
            IngestError::Decode(_) => "decode",
            IngestError::Validation(_) => "validation",
            IngestError::Persist { .. } => "persist",
            IngestError::Timeout(_) => "timeout",
        }
    }
}

pub struct QueueConsumer {
    source: Arc<dyn MessageSource>,
    store: Arc<dyn OrderStore>,
    metrics: Arc<Metrics>,
    config: ConsumerConfig,
}

/// Running consumer task plus its observable state.
pub struct ConsumerHandle {
    state: watch::Receiver<ConsumerState>,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConsumerState> {
        self.state.clone()
    }

    /// Wait for the loop to exit after its token was cancelled.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Consumer task panicked");
        }
    }
}

impl QueueConsumer {
    pub fn new(
        source: Arc<dyn MessageSource>,
        store: Arc<dyn OrderStore>,
        metrics: Arc<Metrics>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            source,
            store,
            metrics,
            config,
        }
    }

    pub fn spawn(self, token: CancellationToken) -> ConsumerHandle {
        let (state_tx, state_rx) = watch::channel(ConsumerState::Idle);
        let task = tokio::spawn(self.run(token, state_tx));
        ConsumerHandle {
            state: state_rx,
            task,
        }
    }

    async fn run(self, token: CancellationToken, state: watch::Sender<ConsumerState>) {
        if !self.config.start_delay.is_zero() {
            tracing::info!(delay = ?self.config.start_delay, "Delaying consumer start");
            tokio::select! {
                _ = token.cancelled() => {
                    state.send_replace(ConsumerState::Stopped);
                    return;
                }
                _ = tokio::time::sleep(self.config.start_delay) => {}
            }
        }

        tracing::info!("🚀 Queue consumer started");

        loop {
            state.send_replace(ConsumerState::Running(Phase::Fetch));

            let fetched = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                fetched = self.source.fetch() => fetched,
            };

            let message = match fetched {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        retry_in = ?self.config.retry_delay,
                        "Failed to fetch message"
                    );
                    self.metrics.record_ingest_failure("fetch");

                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(self.config.retry_delay) => continue,
                    }
                }
            };

            self.handle(message, &state).await;
        }

        state.send_replace(ConsumerState::Stopped);
        tracing::info!("🛑 Queue consumer stopped");
    }

    async fn handle(&self, message: InboundMessage, state: &watch::Sender<ConsumerState>) {
        let started = Instant::now();

        let result = match tokio::time::timeout(
            self.config.message_timeout,
            self.process(&message.payload, state),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(IngestError::Timeout(self.config.message_timeout)),
        };
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(order_uid) => {
                tracing::info!(
                    order_uid = %order_uid,
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    "✅ Order persisted"
                );
                self.metrics.record_consumed("persisted", elapsed);
                self.acknowledge(&message).await;
            }
            Err(e) if e.is_terminal() => {
                tracing::warn!(
                    error = %e,
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    key = ?message.key,
                    "Rejecting message"
                );
                self.metrics.record_ingest_failure(e.reason());
                self.metrics.record_consumed("rejected", elapsed);
                self.acknowledge(&message).await;
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    reason = e.reason(),
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    "Failed to ingest order, it is skipped once a later offset on this partition commits"
                );
                self.metrics.record_ingest_failure(e.reason());
                self.metrics.record_consumed("failed", elapsed);
            }
        }
    }

    /// Decode, validate and persist one payload. Returns the stored order id.
    async fn process(
        &self,
        payload: &[u8],
        state: &watch::Sender<ConsumerState>,
    ) -> Result<String, IngestError> {
        state.send_replace(ConsumerState::Running(Phase::Decode));
        let order: Order = serde_json::from_slice(payload).map_err(IngestError::Decode)?;

        state.send_replace(ConsumerState::Running(Phase::Validate));
        order.validate()?;

        state.send_replace(ConsumerState::Running(Phase::PersistTx));
        let order_uid = order.order_uid.clone();
        tracing::debug!(order_uid = %order_uid, "Persisting order");

        with_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move { tx.upsert(&order).await })
        })
        .await
        .map_err(|source| IngestError::Persist {
            order_uid: order_uid.clone(),
            source,
        })?;

        Ok(order_uid)
    }

    async fn acknowledge(&self, message: &InboundMessage) {
        if let Err(e) = self.source.acknowledge(message).await {
            tracing::warn!(
                error = %e,
                partition = message.partition,
                offset = message.offset,
                "Failed to commit offset, message may be redelivered"
            );
            self.metrics.record_ingest_failure("commit");
        }
    }
}
