//! Authentication middleware: bearer token extraction and session verification.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use orgo_core::models::auth::SessionClaims;

use crate::AppState;
use crate::error::AppError;

/// Verified caller, stored in request extensions by [`require_auth`].
///
/// Handlers receive it explicitly through `Extension` and pass the claims
/// down to the engine.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub claims: SessionClaims,
    /// Raw bearer token, needed to revoke the current session.
    pub token: String,
}

/// The token of an `Authorization: Bearer <token>` header, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Axum middleware: verifies the bearer token (signature, expiry, then
/// cache or store) and injects `AuthenticatedUser` into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| AppError::Unauthorized("Missing or invalid authorization header".into()))?
        .to_string();

    let claims = state
        .engine
        .sessions()
        .authenticate(&token)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".into()))?;

    request
        .extensions_mut()
        .insert(AuthenticatedUser { claims, token });

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn bearer_token_requires_scheme() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));
    }
}
