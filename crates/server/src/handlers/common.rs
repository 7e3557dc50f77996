//! Shared handlers.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

/// GET /v1/health - liveness and dependency check.
///
/// Intentionally unauthenticated for load balancers and orchestration
/// probes.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.storage.health_check().await?;
    state.metadata.health_check().await?;

    Ok(Json(json!({
        "status": "ok",
        "storage": state.storage.backend_name(),
    })))
}
