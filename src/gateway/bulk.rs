use serde::Serialize;
use uuid::Uuid;

use super::{GatewayError, QueryGateway};
use crate::store::with_transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOperation {
    Get,
    Delete,
}

impl BulkOperation {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "get" => Some(BulkOperation::Get),
            "delete" => Some(BulkOperation::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for BulkOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BulkOperation::Get => write!(f, "get"),
            BulkOperation::Delete => write!(f, "delete"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BulkSummary {
    pub gets: usize,
    pub deletes: usize,
}

impl QueryGateway {
    /// Run `operations[i]` against `order_ids[i]` in one transaction.
    ///
    /// Pairs beyond the shorter list are ignored. Any failing pair, or an
    /// operation name that is neither `get` nor `delete`, aborts the whole
    /// batch.
    pub async fn bulk(
        &self,
        operations: &[String],
        order_ids: &[String],
    ) -> Result<BulkSummary, GatewayError> {
        let bulk_id = Uuid::now_v7();

        let plan = match plan(operations, order_ids) {
            Ok(plan) => plan,
            Err(e) => {
                self.metrics.record_bulk("rejected");
                tracing::warn!(bulk_id = %bulk_id, error = %e, "Bulk request rejected");
                return Err(e);
            }
        };

        tracing::info!(bulk_id = %bulk_id, steps = plan.len(), "Running bulk transaction");

        let deleted: Vec<String> = plan
            .iter()
            .filter(|(operation, _)| *operation == BulkOperation::Delete)
            .map(|(_, order_uid)| order_uid.clone())
            .collect();

        let result = with_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let mut summary = BulkSummary::default();

                for (index, (operation, order_uid)) in plan.into_iter().enumerate() {
                    let step = match operation {
                        BulkOperation::Get => tx.get(&order_uid).await.map(|order| {
                            tracing::debug!(
                                bulk_id = %bulk_id,
                                order_uid = %order_uid,
                                track_number = %order.track_number,
                                "Order retrieved in transaction"
                            );
                            summary.gets += 1;
                        }),
                        BulkOperation::Delete => tx.delete(&order_uid).await.map(|()| {
                            tracing::debug!(
                                bulk_id = %bulk_id,
                                order_uid = %order_uid,
                                "Order deleted in transaction"
                            );
                            summary.deletes += 1;
                        }),
                    };

                    step.map_err(|source| GatewayError::BulkStep {
                        index,
                        operation,
                        order_uid,
                        source,
                    })?;
                }

                Ok(summary)
            })
        })
        .await;

        match result {
            Ok(summary) => {
                self.metrics.record_bulk("committed");
                self.invalidate(&deleted).await;
                tracing::info!(
                    bulk_id = %bulk_id,
                    gets = summary.gets,
                    deletes = summary.deletes,
                    "Bulk transaction committed"
                );
                Ok(summary)
            }
            Err(e) => {
                self.metrics.record_bulk("failed");
                tracing::error!(bulk_id = %bulk_id, error = %e, "Bulk transaction failed");
                Err(e)
            }
        }
    }

    /// Drop deleted orders from the cache so they are not served until TTL.
    async fn invalidate(&self, order_uids: &[String]) {
        for order_uid in order_uids {
            if let Err(e) = self.cache.delete(order_uid).await {
                tracing::warn!(order_uid = %order_uid, error = %e, "Failed to evict deleted order from cache");
            }
        }
    }
}

fn plan(
    operations: &[String],
    order_ids: &[String],
) -> Result<Vec<(BulkOperation, String)>, GatewayError> {
    operations
        .iter()
        .zip(order_ids)
        .enumerate()
        .map(|(index, (operation, order_uid))| {
            BulkOperation::parse(operation)
                .map(|op| (op, order_uid.clone()))
                .ok_or_else(|| GatewayError::UnknownOperation {
                    index,
                    operation: operation.clone(),
                })
        })
        .collect()
}
