//! Billing collaborator webhook.
//!
//! Tier transitions (`free → paid` and back) are computed by the external
//! payment provider and pushed here; the quota ledger never derives them
//! itself.

use crate::auth::verify_billing_secret;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use sheetpress_core::job::validate_owner_id;
use sheetpress_core::Tier;
use time::OffsetDateTime;

/// Webhook body.
#[derive(Debug, Deserialize)]
pub struct TierUpdateRequest {
    pub owner_id: String,
    pub tier: String,
}

/// POST /v1/billing/tier - Apply a tier transition from the billing
/// provider. Authenticated by a shared secret, not by the identity proxy.
#[tracing::instrument(skip(state, headers, body))]
pub async fn update_tier(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<TierUpdateRequest>,
) -> ApiResult<StatusCode> {
    verify_billing_secret(&headers, &state.config.billing.webhook_secret_hash)?;

    validate_owner_id(&body.owner_id).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let tier = Tier::parse(&body.tier).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    state
        .metadata
        .set_tier(&body.owner_id, tier, OffsetDateTime::now_utc())
        .await?;

    tracing::info!(owner = %body.owner_id, tier = %tier, "Applied tier transition");
    Ok(StatusCode::NO_CONTENT)
}
