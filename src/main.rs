use std::sync::Arc;

use anyhow::Context;
use kameo::Actor;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod actors;
mod api;
mod cache;
mod config;
mod consumer;
mod gateway;
mod messaging;
mod metrics;
mod models;
mod store;
mod utils;

use actors::{HealthMonitorActor, HealthProbes};
use api::AppState;
use cache::{OrderCache, RedisOrderCache};
use config::AppConfig;
use consumer::QueueConsumer;
use gateway::QueryGateway;
use messaging::KafkaMessageSource;
use store::{OrderStore, PgOrderStore};
use utils::retry_with_backoff;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Invalid configuration")?;

    // RUST_LOG wins over LOG_LEVEL when set.
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new(format!("{},order_service=debug", config.app.log_level))
            }),
        )
        .init();

    tracing::info!(env = %config.app.env, "🚀 Starting order service");

    // === 1. Store and cache (fatal if unreachable after retries) ===
    let startup_retry = config.startup_retry();

    let store = Arc::new(
        retry_with_backoff("postgres_connect", &startup_retry, |_| {
            PgOrderStore::connect(&config.database)
        })
        .await
        .context("Failed to connect to PostgreSQL")?,
    );

    let cache = Arc::new(
        retry_with_backoff("redis_connect", &startup_retry, |_| {
            RedisOrderCache::connect(&config.cache)
        })
        .await
        .context("Failed to connect to Redis")?,
    );

    // === 2. Metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    let registry = metrics.registry().clone();
    let metrics_addr = config.http.metrics_addr.clone();
    actix_web::rt::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(registry, &metrics_addr).await {
            tracing::error!("Metrics server error: {}", e);
        }
    });

    // === 3. Cache warm-up (best effort) ===
    warm_cache(store.as_ref(), cache.as_ref()).await;

    // === 4. Queue consumer ===
    let shutdown = CancellationToken::new();
    let source = KafkaMessageSource::new(&config.kafka, &config.consumer)?;
    let consumer = QueueConsumer::new(
        Arc::new(source),
        store.clone(),
        metrics.clone(),
        config.consumer.clone(),
    )
    .spawn(shutdown.child_token());

    // === 5. Health monitor ===
    let health = HealthMonitorActor::spawn(HealthMonitorActor::new(
        HealthProbes {
            store: store.clone(),
            cache: cache.clone(),
            consumer: consumer.subscribe(),
            metrics: metrics.clone(),
        },
        config.app.health_check_interval,
    ));

    // === 6. HTTP API (runs until SIGINT/SIGTERM) ===
    let gateway = Arc::new(QueryGateway::new(store.clone(), cache.clone(), metrics.clone()));
    let served = api::serve(
        AppState {
            gateway,
            health: health.clone(),
        },
        &config.http.addr,
    )
    .await;

    // === 7. Graceful shutdown ===
    tracing::info!(consumer = %consumer.state(), "🛑 Shutting down");
    shutdown.cancel();
    consumer.join().await;

    if health.stop_gracefully().await.is_err() {
        tracing::debug!("Health monitor already stopped");
    }
    store.close().await;

    tracing::info!("👋 Order service stopped");
    served.context("HTTP server failed")
}

/// Load every stored order into the cache. Failure only costs cold reads.
async fn warm_cache(store: &dyn OrderStore, cache: &dyn OrderCache) {
    let orders = match store.get_all().await {
        Ok(orders) => orders,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load orders for cache warm-up");
            return;
        }
    };

    match cache.preload(&orders).await {
        Ok(()) => tracing::info!(count = orders.len(), "🔥 Cache warmed up"),
        Err(e) => tracing::warn!(error = %e, count = orders.len(), "Cache warm-up failed"),
    }
}
