//! Request handlers for the dispatch API.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::dispatch::{SendRequest, SendResult};
use crate::http::server::AppState;
use crate::resilience::BreakerState;

#[derive(Debug, Serialize)]
pub struct BreakerStatus {
    pub name: String,
    pub state: BreakerState,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub version: &'static str,
    pub status: &'static str,
}

/// JSON error body with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: String) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

/// Dispatch a batch in order; one result per request.
pub async fn send_emails(
    State(state): State<AppState>,
    Json(requests): Json<Vec<SendRequest>>,
) -> Json<Vec<SendResult>> {
    tracing::debug!(count = requests.len(), "Received dispatch batch");

    let mut results = Vec::with_capacity(requests.len());
    for request in requests {
        results.push(state.service.send(request).await);
    }
    Json(results)
}

pub async fn get_status(
    State(state): State<AppState>,
    Path(tracking_id): Path<String>,
) -> Result<Json<SendResult>, ApiError> {
    state
        .service
        .get_status(&tracking_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("No dispatch tracked as {tracking_id}")))
}

pub async fn get_breaker(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<BreakerStatus>, ApiError> {
    match state.service.get_breaker_status(&name) {
        Some(breaker_state) => Ok(Json(BreakerStatus {
            name,
            state: breaker_state,
        })),
        None => Err(ApiError::not_found(format!("Unknown backend {name}"))),
    }
}

pub async fn list_breakers(State(state): State<AppState>) -> Json<Vec<BreakerStatus>> {
    Json(
        state
            .service
            .breaker_states()
            .into_iter()
            .map(|(name, state)| BreakerStatus { name, state })
            .collect(),
    )
}

pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}
