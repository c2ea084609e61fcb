use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

use crate::gateway::GatewayError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Order not found")]
    NotFound,

    #[error("Bulk operations failed: {0}")]
    Bulk(#[source] GatewayError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Map a point-read failure. Cache problems never reach this point.
    pub fn from_lookup(err: GatewayError) -> Self {
        match err {
            GatewayError::MissingOrderId => ApiError::BadRequest("Order ID is required".to_string()),
            GatewayError::NotFound(_) => ApiError::NotFound,
            _ => ApiError::Internal("Error retrieving order".to_string()),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Bulk(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            tracing::error!(error = %self, "Responding with error");
        }
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}
