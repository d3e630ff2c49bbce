//! Axum routes for the registry API.
//!
//! `POST /save/:id` and `PUT /update/:id` are deliberately the same merge
//! behind two verbs; existing dashboards call both.

use crate::api::{ws, ApiError, AppState};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use fleet_core::{FleetError, Registry, Report};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub fn build_router(registry: Arc<Registry>) -> Router {
    let state = Arc::new(AppState { registry });

    Router::new()
        .route("/clients", get(list_clients))
        .route("/clients/:client_id", get(get_client).delete(delete_client))
        .route("/save/:client_id", post(save_client))
        .route("/update/:client_id", put(update_client))
        .route("/health", get(health))
        .route("/", get(root))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "fleetmon-backend",
        "version": env!("CARGO_PKG_VERSION"),
        "clients": state.registry.count().await,
    }))
}

async fn list_clients(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.snapshot().await)
}

async fn get_client(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.registry.get(&client_id).await.ok_or(FleetError::MachineNotFound {
        machine_id: client_id,
    })?;
    Ok(Json(record))
}

async fn delete_client(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.registry.delete(&client_id).await?;
    Ok(Json(serde_json::json!({ "result": "deleted", "id": client_id })))
}

async fn save_client(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    upsert_client(&state.registry, &client_id, payload, "saved").await
}

async fn update_client(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
    upsert_client(&state.registry, &client_id, payload, "updated").await
}

async fn upsert_client(
    registry: &Registry,
    client_id: &str,
    payload: serde_json::Value,
    verb: &str,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !payload.is_object() || payload.as_object().is_some_and(|o| o.is_empty()) {
        return Err(FleetError::MalformedReport {
            reason: "no client data sent".to_string(),
        }
        .into());
    }
    let report: Report = serde_json::from_value(payload).map_err(|e| {
        FleetError::MalformedReport { reason: e.to_string() }
    })?;

    registry.upsert(client_id, report).await?;
    Ok(Json(serde_json::json!({ "result": verb, "id": client_id })))
}
