//! Identity and webhook authentication.
//!
//! The identity provider is an external collaborator: requests arrive with
//! the authenticated owner already resolved by the upstream proxy, carried
//! in a trusted header. This middleware only validates shape and lifts the
//! value into an extension. It performs no verification of its own.

use crate::error::{ApiError, ApiResult};
use axum::extract::Request;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};

/// Header carrying the authenticated owner ID, injected by the identity
/// proxy in front of this service.
pub const OWNER_HEADER: &str = "x-sheetpress-user";

/// Header carrying the billing webhook shared secret.
pub const BILLING_SECRET_HEADER: &str = "x-sheetpress-billing-secret";

/// Authenticated request extension.
#[derive(Clone, Debug)]
pub struct Owner(pub String);

impl Owner {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Middleware for the job routes: require and validate the owner header.
pub async fn identity_middleware(mut req: Request, next: Next) -> Response {
    let owner = match extract_owner(req.headers()) {
        Ok(owner) => owner,
        Err(e) => return e.into_response(),
    };
    req.extensions_mut().insert(owner);
    next.run(req).await
}

fn extract_owner(headers: &HeaderMap) -> ApiResult<Owner> {
    let value = headers
        .get(OWNER_HEADER)
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {OWNER_HEADER} header")))?
        .to_str()
        .map_err(|_| ApiError::Unauthorized(format!("invalid {OWNER_HEADER} header")))?;

    sheetpress_core::job::validate_owner_id(value)
        .map_err(|e| ApiError::Unauthorized(e.to_string()))?;
    Ok(Owner(value.to_string()))
}

/// Verify the billing webhook shared secret against its configured hash.
pub fn verify_billing_secret(headers: &HeaderMap, expected_hash: &str) -> ApiResult<()> {
    let provided = headers
        .get(BILLING_SECRET_HEADER)
        .ok_or_else(|| {
            ApiError::Unauthorized(format!("missing {BILLING_SECRET_HEADER} header"))
        })?
        .to_str()
        .map_err(|_| ApiError::Unauthorized(format!("invalid {BILLING_SECRET_HEADER} header")))?;

    let digest = Sha256::digest(provided.as_bytes());
    let provided_hash = format!("{digest:x}");
    if provided_hash == expected_hash.to_ascii_lowercase() {
        Ok(())
    } else {
        Err(ApiError::Unauthorized(
            "billing webhook secret mismatch".to_string(),
        ))
    }
}
