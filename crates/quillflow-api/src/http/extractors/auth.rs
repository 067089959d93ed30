//! API key authentication extractor.
//!
//! Extracts and verifies API keys from:
//! - `Authorization: Bearer <key>` header
//! - `X-API-Key: <key>` header
//!
//! Keys are SHA-256 hashed and resolved against the `api_keys` table into the
//! caller's `AccountContext`.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use quillflow_types::access::{AccountContext, Capability};
use uuid::Uuid;

use crate::http::error::AppError;
use crate::state::AppState;

/// Authenticated caller. Extracting this validates the API key.
pub struct Authenticated(pub AccountContext);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let api_key = extract_api_key(parts)?;

        match state.api_keys.resolve(&api_key).await? {
            Some(ctx) => Ok(Authenticated(ctx)),
            None => Err(AppError::Unauthorized(
                "Invalid API key. Provide a valid key via 'Authorization: Bearer <key>' or 'X-API-Key: <key>' header.".to_string(),
            )),
        }
    }
}

/// Extract the API key from request headers.
fn extract_api_key(parts: &Parts) -> Result<String, AppError> {
    // Try Authorization: Bearer <key>
    if let Some(auth) = parts.headers.get("authorization") {
        let auth_str = auth.to_str().map_err(|_| {
            AppError::Unauthorized("Invalid Authorization header encoding".to_string())
        })?;
        if let Some(key) = auth_str.strip_prefix("Bearer ") {
            return Ok(key.trim().to_string());
        }
    }

    // Try X-API-Key header
    if let Some(key) = parts.headers.get("x-api-key") {
        let key_str = key.to_str().map_err(|_| {
            AppError::Unauthorized("Invalid X-API-Key header encoding".to_string())
        })?;
        return Ok(key_str.trim().to_string());
    }

    Err(AppError::Unauthorized(
        "Missing API key. Provide via 'Authorization: Bearer <key>' or 'X-API-Key: <key>' header.".to_string(),
    ))
}

/// Create a full-access key for `account_id` when no key exists yet.
///
/// Returns the plaintext key when one was created, `None` otherwise.
pub async fn ensure_api_key(state: &AppState, account_id: Uuid) -> anyhow::Result<Option<String>> {
    if !state.api_keys.list(None).await?.is_empty() {
        return Ok(None);
    }

    let (_, key) = state
        .api_keys
        .create("default", account_id, &Capability::ALL)
        .await?;
    Ok(Some(key))
}
