use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{cache_key, CacheError, OrderCache};
use crate::config::CacheConfig;
use crate::models::Order;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

/// Redis-backed order cache.
///
/// `ConnectionManager` reconnects on its own and is cheap to clone, so each
/// call works on a clone instead of locking a shared connection.
#[derive(Clone)]
pub struct RedisOrderCache {
    conn: ConnectionManager,
    ttl: Duration,
    circuit_breaker: CircuitBreaker,
}

impl RedisOrderCache {
    pub async fn connect(config: &CacheConfig) -> Result<Self, CacheError> {
        let info = config
            .connection_info()
            .map_err(|e| CacheError::Config(e.to_string()))?;
        let client = redis::Client::open(info)?;
        let conn = ConnectionManager::new(client).await?;

        let cache = Self {
            conn,
            ttl: config.ttl,
            circuit_breaker: CircuitBreaker::new(
                "redis",
                CircuitBreakerConfig {
                    failure_threshold: config.breaker_failure_threshold,
                    cooldown: config.breaker_cooldown,
                    ..CircuitBreakerConfig::default()
                },
            ),
        };
        cache.ping().await?;

        tracing::info!(addr = %config.addr, db = config.db, ttl = ?config.ttl, "Connected to Redis");
        Ok(cache)
    }

    fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs().max(1)
    }
}

#[async_trait]
impl OrderCache for RedisOrderCache {
    async fn set(&self, order: &Order) -> Result<(), CacheError> {
        let key = cache_key(&order.order_uid);
        let payload = serde_json::to_string(order)?;
        let ttl = self.ttl_secs();
        let mut conn = self.conn.clone();

        self.circuit_breaker
            .call(async move {
                let _: () = conn.set_ex(&key, payload, ttl).await?;
                Ok::<_, CacheError>(())
            })
            .await?;

        tracing::trace!(order_uid = %order.order_uid, "Order cached");
        Ok(())
    }

    async fn get(&self, order_uid: &str) -> Result<Option<Order>, CacheError> {
        let key = cache_key(order_uid);
        let mut conn = self.conn.clone();

        let payload = self
            .circuit_breaker
            .call(async move {
                let payload: Option<String> = conn.get(&key).await?;
                Ok::<_, CacheError>(payload)
            })
            .await?;

        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, order_uid: &str) -> Result<(), CacheError> {
        let key = cache_key(order_uid);
        let mut conn = self.conn.clone();

        self.circuit_breaker
            .call(async move {
                let _: i64 = conn.del(&key).await?;
                Ok::<_, CacheError>(())
            })
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();

        self.circuit_breaker
            .call(async move {
                let _: String = redis::cmd("PING").query_async(&mut conn).await?;
                Ok::<_, CacheError>(())
            })
            .await?;
        Ok(())
    }

    async fn breaker_state(&self) -> CircuitState {
        self.circuit_breaker.state().await
    }
}
