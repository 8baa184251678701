//! Administrative endpoints.

use std::collections::HashMap;

use axum::extract::State;
use axum::response::Json;
use serde::Serialize;

use spillway_core::proxy::BreakerSnapshot;
use spillway_core::GatewayState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Provider names in priority order.
    pub providers: Vec<String>,
    pub circuit_breakers: HashMap<String, BreakerSnapshot>,
}

pub async fn health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        providers: state.config.providers.iter().map(|p| p.name.clone()).collect(),
        circuit_breakers: state.registry.status(),
    })
}

pub async fn reset_circuit(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    state.registry.reset_all();
    tracing::info!("all circuit breakers reset via admin endpoint");
    Json(serde_json::json!({"status": "all circuit breakers reset"}))
}
