//! Liveness and Prometheus metrics.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::models::HealthResponse;
use crate::router::CaState;

/// GET /health
pub async fn health(State(state): State<CaState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        issuers: state.service.registry().list().len(),
    })
}

/// GET /metrics
pub async fn metrics(State(state): State<CaState>) -> Response {
    let mut buffer = String::new();
    let registry = state.metrics.lock();

    match prometheus_client::encoding::text::encode(&mut buffer, &registry) {
        Ok(()) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            buffer,
        )
            .into_response(),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response(),
    }
}
