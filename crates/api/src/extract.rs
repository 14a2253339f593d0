//! Request extractors.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::error::ApiError;
use crate::state::AppState;

/// Pulls the token out of an `Authorization: Bearer <token>` header.
///
/// The error is the message to report; callers choose the status.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, &'static str> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or("missing authorization header")?
        .to_str()
        .map_err(|_| "invalid authorization format")?;

    match header.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() => {
            Ok(token)
        }
        _ => Err("invalid authorization format"),
    }
}

/// The caller behind a valid, unrevoked access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub email: String,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .map_err(|msg| ApiError::Unauthorized(msg.to_string()))?;
        let claims = state.auth.authenticate(token)?;
        Ok(AuthUser { email: claims.sub })
    }
}
