//! HTTP and WebSocket API surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fleet_core::{FleetError, Registry};
use std::sync::Arc;

mod routes;
mod ws;

pub use routes::build_router;

/// Shared application state.
pub struct AppState {
    pub registry: Arc<Registry>,
}

/// Maps core errors onto HTTP responses. Nothing here is fatal to the
/// serving loop; everything comes back as a structured JSON error.
pub struct ApiError(FleetError);

impl From<FleetError> for ApiError {
    fn from(err: FleetError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            FleetError::MachineNotFound { .. } => StatusCode::NOT_FOUND,
            FleetError::MalformedReport { .. } | FleetError::UnknownMachine { .. } => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}
