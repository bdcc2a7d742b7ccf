//! Model API key management.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use crate::auth::AuthPrincipal;
use crate::error::{ApiError, ApiResult};
use crate::quota::EndpointClass;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct StoreCredentialRequest {
    #[validate(length(min = 10, max = 200))]
    pub api_key: String,
}

/// `PUT /api/credentials`: store the caller's model API key (encrypted).
pub async fn store_credential(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
    Json(request): Json<StoreCredentialRequest>,
) -> ApiResult<StatusCode> {
    state.quota.check(EndpointClass::Status, &principal)?;
    request
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    state
        .controller
        .vault()
        .store_key(&principal, request.api_key.trim())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/credentials`.
pub async fn delete_credential(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
) -> ApiResult<StatusCode> {
    state.quota.check(EndpointClass::Status, &principal)?;
    state.controller.vault().delete_key(&principal).await?;
    Ok(StatusCode::NO_CONTENT)
}
