use async_trait::async_trait;
use futures_util::future::BoxFuture;

use super::errors::StoreError;
use crate::models::Order;

// ============================================================================
// Repository Capabilities
// ============================================================================
//
// `OrderStore` is the pool-bound view of the repository, `OrderTx` the view
// bound to one open transaction. Both expose the same keyed operations so
// ingestion and query code never depend on a concrete database client.
//
// ============================================================================

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, order_uid: &str) -> Result<Order, StoreError>;

    /// Insert or fully replace the order keyed by `order_uid`.
    async fn upsert(&self, order: &Order) -> Result<(), StoreError>;

    /// Every order, newest `date_created` first.
    async fn get_all(&self) -> Result<Vec<Order>, StoreError>;

    async fn delete(&self, order_uid: &str) -> Result<(), StoreError>;

    /// Open a READ COMMITTED, READ WRITE transaction.
    async fn begin(&self) -> Result<Box<dyn OrderTx>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// An open transaction. Dropping it without `commit` rolls it back.
#[async_trait]
pub trait OrderTx: Send {
    async fn get(&mut self, order_uid: &str) -> Result<Order, StoreError>;

    async fn upsert(&mut self, order: &Order) -> Result<(), StoreError>;

    async fn delete(&mut self, order_uid: &str) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Run `work` inside one transaction: commit when it returns `Ok`, roll back
/// and return its error otherwise. If the returned future is dropped midway
/// (timeout, cancellation) the transaction is dropped and rolled back too.
///
/// `work` may fail with any error that a `StoreError` converts into, so
/// callers can attach their own context to the failing step.
pub async fn with_transaction<T, E, F>(store: &dyn OrderStore, work: F) -> Result<T, E>
where
    T: Send,
    E: From<StoreError> + std::fmt::Display + Send,
    F: for<'t> FnOnce(&'t mut dyn OrderTx) -> BoxFuture<'t, Result<T, E>> + Send,
{
    let mut tx = store.begin().await?;
    let outcome = work(tx.as_mut()).await;

    match outcome {
        Ok(value) => {
            tx.commit().await?;
            tracing::debug!("Transaction committed");
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback_error) = tx.rollback().await {
                tracing::error!(
                    error = %error,
                    rollback_error = %rollback_error,
                    "Rollback failed after transaction error"
                );
            } else {
                tracing::debug!(error = %error, "Transaction rolled back");
            }
            Err(error)
        }
    }
}
