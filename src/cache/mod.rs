// ============================================================================
// Order Cache
// ============================================================================
//
// Cache-aside front end over the order store. The cache never loads from
// the store itself; callers fill it after a miss.
//
// Key layout: `order:{order_uid}`, value = the full JSON order, fixed TTL.
//
// ============================================================================

mod redis;

#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;

use crate::models::Order;
use crate::utils::{CircuitBreakerError, CircuitState};

pub use self::redis::RedisOrderCache;

const KEY_PREFIX: &str = "order:";

pub fn cache_key(order_uid: &str) -> String {
    format!("{KEY_PREFIX}{order_uid}")
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to encode or decode cached order: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("redis error: {0}")]
    Transport(#[from] ::redis::RedisError),

    #[error("cache circuit breaker is open")]
    CircuitOpen,

    #[error("invalid cache configuration: {0}")]
    Config(String),
}

impl From<CircuitBreakerError<CacheError>> for CacheError {
    fn from(err: CircuitBreakerError<CacheError>) -> Self {
        match err {
            CircuitBreakerError::CircuitOpen => CacheError::CircuitOpen,
            CircuitBreakerError::OperationFailed(e) => e,
        }
    }
}

#[async_trait]
pub trait OrderCache: Send + Sync {
    /// Store the order under its key, overwriting any previous value.
    async fn set(&self, order: &Order) -> Result<(), CacheError>;

    /// `Ok(None)` is a miss; `Err` means the cache could not answer.
    async fn get(&self, order_uid: &str) -> Result<Option<Order>, CacheError>;

    /// Warm the cache from a store snapshot. Stops at the first failure.
    async fn preload(&self, orders: &[Order]) -> Result<(), CacheError> {
        for order in orders {
            self.set(order).await?;
        }
        Ok(())
    }

    /// Remove a cached order. Absent keys are not an error.
    async fn delete(&self, order_uid: &str) -> Result<(), CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;

    /// Circuit state of the guarded backend, if any.
    async fn breaker_state(&self) -> CircuitState {
        CircuitState::Closed
    }
}
