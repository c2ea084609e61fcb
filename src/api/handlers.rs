use std::time::Instant;

use actix_web::{web, HttpResponse};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::error::ApiError;
use super::AppState;
use crate::actors::GetSystemHealth;
use crate::gateway::OrderSource;
use crate::models::Order;

#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    #[serde(default, alias = "opertaions")]
    pub operations: Vec<String>,
    #[serde(default)]
    pub order_ids: Vec<String>,
}

#[derive(Serialize)]
struct OrderResponse<'a> {
    order: &'a Order,
    source: OrderSource,
    timing: Timing,
}

#[derive(Serialize)]
struct Timing {
    total: String,
    fetch: String,
    source: OrderSource,
}

/// GET /api/order/{order_uid}
pub async fn get_order(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let started = Instant::now();
    let order_uid = path.into_inner();

    let lookup = state
        .gateway
        .get_order(&order_uid)
        .await
        .map_err(ApiError::from_lookup)?;
    let total = started.elapsed();

    tracing::info!(
        order_uid = %order_uid,
        source = lookup.source.as_str(),
        total = ?total,
        fetch = ?lookup.fetch_time,
        "Order fetched"
    );

    Ok(HttpResponse::Ok().json(OrderResponse {
        order: &lookup.order,
        source: lookup.source,
        timing: Timing {
            total: format!("{:?}", total),
            fetch: format!("{:?}", lookup.fetch_time),
            source: lookup.source,
        },
    }))
}

/// GET /api/order/ without an id
pub async fn missing_order_id() -> Result<HttpResponse, ApiError> {
    Err(ApiError::BadRequest("Order ID is required".to_string()))
}

/// POST /api/orders/bulk
pub async fn bulk_operations(
    state: web::Data<AppState>,
    body: web::Json<BulkRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = body.into_inner();

    let summary = state
        .gateway
        .bulk(&request.operations, &request.order_ids)
        .await
        .map_err(ApiError::Bulk)?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Bulk operations completed successfully",
        "gets": summary.gets,
        "deletes": summary.deletes,
    })))
}

/// GET /api/benchmark
pub async fn benchmark(state: web::Data<AppState>) -> HttpResponse {
    let cached_ids: Vec<String> = (1..=5).map(|n| format!("test-order-{n}")).collect();
    let db_ids: Vec<String> = (6..=10).map(|n| format!("test-order-{n}")).collect();

    let report = state.gateway.benchmark(&cached_ids, &db_ids).await;

    let results: serde_json::Map<String, serde_json::Value> = report
        .samples
        .iter()
        .map(|(order_uid, sample)| {
            (
                order_uid.clone(),
                json!({
                    "source": sample.source,
                    "duration": format!("{:?}", sample.duration),
                    "success": sample.success,
                }),
            )
        })
        .collect();

    HttpResponse::Ok().json(json!({
        "results": results,
        "summary": {
            "cache_requests": report.cache_requests,
            "db_requests": report.db_requests,
            "avg_cache_time": format!("{:?}", report.avg_cache_time),
            "avg_db_time": format!("{:?}", report.avg_db_time),
            "speed_ratio": report.speed_ratio,
        },
    }))
}

/// GET /api/health
pub async fn health(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let system = state.health.ask(GetSystemHealth).await.map_err(|_| {
        tracing::error!("Health monitor unavailable");
        ApiError::Internal("Health monitor unavailable".to_string())
    })?;

    Ok(HttpResponse::Ok().json(json!({
        "status": system.overall_status.as_str(),
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        "components": system.components,
    })))
}
