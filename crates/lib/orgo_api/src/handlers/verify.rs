//! Status-only verification endpoints.
//!
//! These answer with 200, 401 or 403 and no body, so they bypass the
//! JSON error mapping of the auth middleware.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use orgo_core::auth::rbac::{has_permission, has_role};
use orgo_core::models::auth::SessionClaims;
use tracing::warn;

use crate::AppState;
use crate::middleware::auth::bearer_token;
use crate::models::{PermissionQuery, RoleQuery};

async fn verified_claims(state: &AppState, headers: &HeaderMap) -> Result<SessionClaims, StatusCode> {
    let token = bearer_token(headers).ok_or(StatusCode::UNAUTHORIZED)?;
    match state.engine.sessions().authenticate(token).await {
        Ok(Some(claims)) => Ok(claims),
        Ok(None) => Err(StatusCode::UNAUTHORIZED),
        Err(e) => {
            warn!(error = %e, "token verification failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// `GET /api/verify`
pub async fn verify_handler(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    match verified_claims(&state, &headers).await {
        Ok(_) => StatusCode::OK,
        Err(status) => status,
    }
}

/// `GET /api/verify_role?role=NAME`
pub async fn verify_role_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<RoleQuery>,
) -> StatusCode {
    match verified_claims(&state, &headers).await {
        Ok(claims) if has_role(&claims, &query.role) => StatusCode::OK,
        Ok(_) => StatusCode::FORBIDDEN,
        Err(status) => status,
    }
}

/// `GET /api/verify_permission?permission=NAME`
pub async fn verify_permission_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PermissionQuery>,
) -> StatusCode {
    match verified_claims(&state, &headers).await {
        Ok(claims) if has_permission(&claims, &query.permission) => StatusCode::OK,
        Ok(_) => StatusCode::FORBIDDEN,
        Err(status) => status,
    }
}
