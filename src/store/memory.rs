use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::errors::StoreError;
use super::repository::{OrderStore, OrderTx};
use crate::models::Order;

/// In-memory order store for tests.
///
/// Transactions stage their writes and apply them on commit, so a rolled
/// back transaction leaves no trace. Upserts for ids registered with
/// `fail_upserts_for` fail with a transport error; transactional upserts for
/// ids registered with `delay_upserts_for` stall first.
#[derive(Clone, Default)]
pub struct MemoryOrderStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    rows: Mutex<HashMap<String, Order>>,
    failing_upserts: Mutex<HashSet<String>>,
    slow_upserts: Mutex<HashMap<String, Duration>>,
    commits: Mutex<u32>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_upserts_for(&self, order_uid: &str) {
        self.inner
            .failing_upserts
            .lock()
            .unwrap()
            .insert(order_uid.to_string());
    }

    pub fn delay_upserts_for(&self, order_uid: &str, delay: Duration) {
        self.inner
            .slow_upserts
            .lock()
            .unwrap()
            .insert(order_uid.to_string(), delay);
    }

    pub fn contains(&self, order_uid: &str) -> bool {
        self.inner.rows.lock().unwrap().contains_key(order_uid)
    }

    pub fn len(&self) -> usize {
        self.inner.rows.lock().unwrap().len()
    }

    pub fn commit_count(&self) -> u32 {
        *self.inner.commits.lock().unwrap()
    }

    fn check_upsert(&self, order: &Order) -> Result<(), StoreError> {
        order.validate()?;
        if self.inner.failing_upserts.lock().unwrap().contains(&order.order_uid) {
            return Err(StoreError::Transport(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn get(&self, order_uid: &str) -> Result<Order, StoreError> {
        self.inner
            .rows
            .lock()
            .unwrap()
            .get(order_uid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(order_uid.to_string()))
    }

    async fn upsert(&self, order: &Order) -> Result<(), StoreError> {
        self.check_upsert(order)?;
        self.inner
            .rows
            .lock()
            .unwrap()
            .insert(order.order_uid.clone(), order.clone());
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self.inner.rows.lock().unwrap().values().cloned().collect();
        orders.sort_by(|a, b| b.date_created.cmp(&a.date_created));
        Ok(orders)
    }

    async fn delete(&self, order_uid: &str) -> Result<(), StoreError> {
        self.inner
            .rows
            .lock()
            .unwrap()
            .remove(order_uid)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(order_uid.to_string()))
    }

    async fn begin(&self) -> Result<Box<dyn OrderTx>, StoreError> {
        Ok(Box::new(MemoryTx {
            store: self.clone(),
            staged: HashMap::new(),
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// `None` in `staged` marks a pending delete.
struct MemoryTx {
    store: MemoryOrderStore,
    staged: HashMap<String, Option<Order>>,
}

impl MemoryTx {
    fn visible(&self, order_uid: &str) -> Option<Order> {
        match self.staged.get(order_uid) {
            Some(staged) => staged.clone(),
            None => self.store.inner.rows.lock().unwrap().get(order_uid).cloned(),
        }
    }
}

#[async_trait]
impl OrderTx for MemoryTx {
    async fn get(&mut self, order_uid: &str) -> Result<Order, StoreError> {
        self.visible(order_uid)
            .ok_or_else(|| StoreError::NotFound(order_uid.to_string()))
    }

    async fn upsert(&mut self, order: &Order) -> Result<(), StoreError> {
        let delay = self.store.inner.slow_upserts.lock().unwrap().get(&order.order_uid).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.store.check_upsert(order)?;
        self.staged.insert(order.order_uid.clone(), Some(order.clone()));
        Ok(())
    }

    async fn delete(&mut self, order_uid: &str) -> Result<(), StoreError> {
        if self.visible(order_uid).is_none() {
            return Err(StoreError::NotFound(order_uid.to_string()));
        }
        self.staged.insert(order_uid.to_string(), None);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx { store, staged } = *self;
        {
            let mut rows = store.inner.rows.lock().unwrap();
            for (order_uid, change) in staged {
                match change {
                    Some(order) => rows.insert(order_uid, order),
                    None => rows.remove(&order_uid),
                };
            }
        }
        *store.inner.commits.lock().unwrap() += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
