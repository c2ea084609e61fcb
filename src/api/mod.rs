// ============================================================================
// HTTP API
// ============================================================================
//
// GET  /api/order/{order_uid}  cache-aside point read
// POST /api/orders/bulk        transactional get/delete batch
// GET  /api/health             aggregated component health
// GET  /api/benchmark          cache vs database read timing
//
// ============================================================================

mod error;
mod handlers;

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use kameo::actor::ActorRef;

use crate::actors::HealthMonitorActor;
use crate::gateway::QueryGateway;

pub use error::ApiError;

pub struct AppState {
    pub gateway: Arc<QueryGateway>,
    pub health: ActorRef<HealthMonitorActor>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    let json_config = web::JsonConfig::default().error_handler(|err, _req| {
        ApiError::BadRequest(format!("Invalid request body: {}", err)).into()
    });

    cfg.service(
        web::scope("/api")
            .app_data(json_config)
            .route("/health", web::get().to(handlers::health))
            .route("/benchmark", web::get().to(handlers::benchmark))
            .route("/order", web::get().to(handlers::missing_order_id))
            .route("/order/", web::get().to(handlers::missing_order_id))
            .route("/order/{order_uid}", web::get().to(handlers::get_order))
            .route("/orders/bulk", web::post().to(handlers::bulk_operations)),
    );
}

/// Run the API listener until the process receives a shutdown signal.
pub async fn serve(state: AppState, addr: &str) -> std::io::Result<()> {
    let state = web::Data::new(state);

    tracing::info!("🌐 Starting HTTP server on http://{}", addr);

    HttpServer::new(move || App::new().app_data(state.clone()).configure(configure))
        .bind(addr)?
        .run()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::fixtures::{harness, wait_until_cached, Harness};
    use crate::models::fixtures::sample_order;
    use crate::store::OrderStore;
    use actix_web::http::StatusCode;
    use actix_web::test;
    use kameo::Actor;
    use serde_json::{json, Value};

    fn app_state(h: &Harness) -> web::Data<AppState> {
        web::Data::new(AppState {
            gateway: h.gateway.clone(),
            health: HealthMonitorActor::spawn(HealthMonitorActor::passive()),
        })
    }

    #[actix_web::test]
    async fn test_order_is_served_from_database_then_cache() {
        let h = harness();
        h.store.upsert(&sample_order("test-order-123")).await.unwrap();
        let app = test::init_service(App::new().app_data(app_state(&h)).configure(configure)).await;

        let req = test::TestRequest::get().uri("/api/order/test-order-123").to_request();
        let first: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(first["source"], "database");
        assert_eq!(first["timing"]["source"], "database");
        assert_eq!(first["order"]["track_number"], "WBILMTESTTRACK");
        assert_eq!(first["order"]["items"][0]["chrt_id"], 9934930);

        wait_until_cached(&h.cache, "test-order-123").await;

        let req = test::TestRequest::get().uri("/api/order/test-order-123").to_request();
        let second: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(second["source"], "cache");
        assert_eq!(second["order"], first["order"]);
    }

    #[actix_web::test]
    async fn test_unknown_order_is_404() {
        let h = harness();
        let app = test::init_service(App::new().app_data(app_state(&h)).configure(configure)).await;

        let req = test::TestRequest::get().uri("/api/order/missing").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Order not found");
    }

    #[actix_web::test]
    async fn test_missing_order_id_is_400() {
        let h = harness();
        let app = test::init_service(App::new().app_data(app_state(&h)).configure(configure)).await;

        let req = test::TestRequest::get().uri("/api/order/").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_bulk_accepts_misspelled_operations_key() {
        let h = harness();
        h.store.upsert(&sample_order("A")).await.unwrap();
        h.store.upsert(&sample_order("B")).await.unwrap();
        let app = test::init_service(App::new().app_data(app_state(&h)).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/orders/bulk")
            .set_json(json!({ "opertaions": ["get", "delete"], "order_ids": ["A", "B"] }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["deletes"], 1);
        assert!(!h.store.contains("B"));
    }

    #[actix_web::test]
    async fn test_failed_bulk_is_500_and_names_operation() {
        let h = harness();
        h.store.upsert(&sample_order("A")).await.unwrap();
        let app = test::init_service(App::new().app_data(app_state(&h)).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/orders/bulk")
            .set_json(json!({
                "operations": ["get", "delete", "get"],
                "order_ids": ["A", "B", "A"]
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: Value = test::read_body_json(resp).await;
        let message = body["error"].as_str().unwrap();
        assert!(message.starts_with("Bulk operations failed"));
        assert!(message.contains("delete B"));
        assert!(h.store.contains("A"));
    }

    #[actix_web::test]
    async fn test_malformed_bulk_body_is_400() {
        let h = harness();
        let app = test::init_service(App::new().app_data(app_state(&h)).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/orders/bulk")
            .insert_header(("content-type", "application/json"))
            .set_payload("{\"operations\": \"get\"")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_benchmark_reports_summary() {
        let h = harness();
        for n in 1..=10 {
            h.store.upsert(&sample_order(&format!("test-order-{n}"))).await.unwrap();
        }
        let app = test::init_service(App::new().app_data(app_state(&h)).configure(configure)).await;

        let req = test::TestRequest::get().uri("/api/benchmark").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["summary"]["cache_requests"], 5);
        assert_eq!(body["summary"]["db_requests"], 5);
        assert!(body["summary"]["avg_cache_time"].is_string());
        assert_eq!(body["results"]["test-order-1"]["source"], "cache");
        assert_eq!(body["results"]["test-order-1"]["success"], true);
        assert_eq!(body["results"]["test-order-10"]["source"], "database");
        assert!(h.cache.contains("test-order-3"));
    }

    #[actix_web::test]
    async fn test_health_reports_components() {
        let h = harness();
        let state = app_state(&h);
        state
            .health
            .tell(crate::actors::UpdateHealth {
                component: "postgres".to_string(),
                health: crate::actors::ComponentHealth::new(crate::actors::HealthStatus::Healthy),
            })
            .await
            .unwrap();
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["status"], "healthy");
        assert!(body["timestamp"].is_string());
        assert_eq!(body["components"]["postgres"]["status"], "healthy");
    }
}
