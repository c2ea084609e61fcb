use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::cache::OrderCache;
use crate::metrics::Metrics;
use crate::models::Order;
use crate::store::{OrderStore, StoreError};

mod benchmark;
mod bulk;

pub use benchmark::{BenchmarkReport, ReadSample};
pub use bulk::{BulkOperation, BulkSummary};

// ============================================================================
// Query Gateway
// ============================================================================
//
// Request-facing read path and bulk transactional operations.
//
// Point reads are cache-aside: cache first, store on miss or cache failure,
// then a detached write-back fills the cache. A cache outage only costs
// latency, never a failed read.
//
// `benchmark` times cache reads against direct store reads for the
// diagnostics endpoint.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSource {
    Cache,
    Database,
}

impl OrderSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSource::Cache => "cache",
            OrderSource::Database => "database",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderLookup {
    pub order: Order,
    pub source: OrderSource,
    /// Time spent in the source that answered.
    pub fetch_time: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("order id is required")]
    MissingOrderId,

    #[error("order not found: {0}")]
    NotFound(String),

    #[error("failed to read order {order_uid}: {source}")]
    Store {
        order_uid: String,
        #[source]
        source: StoreError,
    },

    #[error("unknown operation {operation:?} at position {index}")]
    UnknownOperation { index: usize, operation: String },

    #[error("{operation} {order_uid} (position {index}) failed: {source}")]
    BulkStep {
        index: usize,
        operation: BulkOperation,
        order_uid: String,
        #[source]
        source: StoreError,
    },

    #[error("transaction failed: {0}")]
    Transaction(#[from] StoreError),
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound(_))
    }
}

pub struct QueryGateway {
    store: Arc<dyn OrderStore>,
    cache: Arc<dyn OrderCache>,
    metrics: Arc<Metrics>,
}

impl QueryGateway {
    pub fn new(store: Arc<dyn OrderStore>, cache: Arc<dyn OrderCache>, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            cache,
            metrics,
        }
    }

    pub async fn get_order(&self, order_uid: &str) -> Result<OrderLookup, GatewayError> {
        if order_uid.trim().is_empty() {
            return Err(GatewayError::MissingOrderId);
        }

        let cache_started = Instant::now();
        match self.cache.get(order_uid).await {
            Ok(Some(order)) => {
                let fetch_time = cache_started.elapsed();
                self.metrics.record_cache_lookup("hit");
                self.metrics.record_read(OrderSource::Cache.as_str());
                tracing::debug!(order_uid = %order_uid, fetch = ?fetch_time, "Cache hit");

                return Ok(OrderLookup {
                    order,
                    source: OrderSource::Cache,
                    fetch_time,
                });
            }
            Ok(None) => {
                self.metrics.record_cache_lookup("miss");
                tracing::debug!(order_uid = %order_uid, "Cache miss, checking database");
            }
            Err(e) => {
                self.metrics.record_cache_lookup("error");
                tracing::warn!(order_uid = %order_uid, error = %e, "Cache unavailable, falling back to database");
            }
        }

        let db_started = Instant::now();
        let order = match self.store.get(order_uid).await {
            Ok(order) => order,
            Err(e) if e.is_not_found() => {
                tracing::debug!(order_uid = %order_uid, "Order not found in database");
                return Err(GatewayError::NotFound(order_uid.to_string()));
            }
            Err(source) => {
                tracing::error!(
                    order_uid = %order_uid,
                    kind = source.kind(),
                    error = %source,
                    "Failed to read order from database"
                );
                return Err(GatewayError::Store {
                    order_uid: order_uid.to_string(),
                    source,
                });
            }
        };
        let fetch_time = db_started.elapsed();
        self.metrics.record_read(OrderSource::Database.as_str());

        self.spawn_write_back(order.clone());

        Ok(OrderLookup {
            order,
            source: OrderSource::Database,
            fetch_time,
        })
    }

    /// Fill the cache in the background. The response never waits for it.
    fn spawn_write_back(&self, order: Order) {
        let cache = self.cache.clone();
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            match cache.set(&order).await {
                Ok(()) => {
                    tracing::debug!(order_uid = %order.order_uid, "Order written back to cache");
                }
                Err(e) => {
                    metrics.record_writeback_failure();
                    tracing::warn!(
                        order_uid = %order.order_uid,
                        error = %e,
                        "Failed to write order back to cache"
                    );
                }
            }
        });
    }
}
