use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{cache_key, CacheError, OrderCache};
use crate::models::Order;

/// TTL-aware in-memory cache for tests, with outage simulation.
#[derive(Clone)]
pub struct MemoryOrderCache {
    ttl: Duration,
    entries: Arc<Mutex<HashMap<String, (String, Instant)>>>,
    offline: Arc<AtomicBool>,
    sets_before_failure: Arc<AtomicUsize>,
}

impl MemoryOrderCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::default(),
            offline: Arc::default(),
            sets_before_failure: Arc::new(AtomicUsize::new(usize::MAX)),
        }
    }

    /// While offline every call fails with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Let `n` more `set` calls succeed, then fail the rest.
    pub fn fail_sets_after(&self, n: usize) {
        self.sets_before_failure.store(n, Ordering::SeqCst);
    }

    pub fn contains(&self, order_uid: &str) -> bool {
        let entries = self.entries.lock().unwrap();
        entries
            .get(&cache_key(order_uid))
            .is_some_and(|(_, expires_at)| *expires_at > Instant::now())
    }

    fn check_online(&self) -> Result<(), CacheError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(outage());
        }
        Ok(())
    }
}

fn outage() -> CacheError {
    CacheError::Transport(redis::RedisError::from((
        redis::ErrorKind::IoError,
        "cache offline",
    )))
}

#[async_trait]
impl OrderCache for MemoryOrderCache {
    async fn set(&self, order: &Order) -> Result<(), CacheError> {
        self.check_online()?;
        let allowed = self
            .sets_before_failure
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !allowed {
            return Err(outage());
        }

        let payload = serde_json::to_string(order)?;
        self.entries.lock().unwrap().insert(
            cache_key(&order.order_uid),
            (payload, Instant::now() + self.ttl),
        );
        Ok(())
    }

    async fn get(&self, order_uid: &str) -> Result<Option<Order>, CacheError> {
        self.check_online()?;
        let key = cache_key(order_uid);
        let mut entries = self.entries.lock().unwrap();

        match entries.get(&key) {
            Some((payload, expires_at)) if *expires_at > Instant::now() => {
                Ok(Some(serde_json::from_str(payload)?))
            }
            Some(_) => {
                entries.remove(&key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, order_uid: &str) -> Result<(), CacheError> {
        self.check_online()?;
        self.entries.lock().unwrap().remove(&cache_key(order_uid));
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.check_online()
    }
}
