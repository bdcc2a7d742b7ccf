//! Bearer-token authentication.
//!
//! Tokens are HS256 JWTs whose `sub` claim carries the opaque principal id.
//! Token issuance lives outside the core; this surface only verifies.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use lclip_models::PrincipalId;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Principal id
    pub sub: String,
    /// Expiry (unix seconds)
    pub exp: usize,
}

/// Verifies bearer tokens against the shared secret.
#[derive(Clone)]
pub struct AuthVerifier {
    decoding_key: DecodingKey,
}

impl AuthVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Create from the `AUTH_SECRET` environment variable.
    pub fn from_env() -> Result<Self, String> {
        let secret = std::env::var("AUTH_SECRET").map_err(|_| "AUTH_SECRET not set".to_string())?;
        Ok(Self::new(&secret))
    }

    /// Verify a token and return its principal.
    pub fn verify(&self, token: &str) -> Result<PrincipalId, ApiError> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|e| ApiError::unauthorized(format!("invalid token: {}", e)))?;
        if data.claims.sub.trim().is_empty() {
            return Err(ApiError::unauthorized("token has no subject"));
        }
        Ok(PrincipalId::new(data.claims.sub))
    }
}

/// Extractor yielding the authenticated principal from the Authorization
/// header.
pub struct AuthPrincipal(pub PrincipalId);

#[async_trait]
impl FromRequestParts<AppState> for AuthPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("missing Authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("expected a Bearer token"))?;

        Ok(AuthPrincipal(state.auth.verify(token)?))
    }
}
