//! Registration, login and logout handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use orgo_core::auth::service::{NewAccount, Session};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{AuthResponse, LoginRequest, RegisterRequest, RevokedResponse};

fn auth_response(session: Session) -> AuthResponse {
    AuthResponse {
        token: session.issued.token,
        expires_at: session.issued.expires_at,
        user: session.principal.into(),
    }
}

/// `POST /api/register`: create an account and return its first token.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let session = state
        .engine
        .accounts()
        .register(NewAccount {
            username: body.username,
            email: body.email,
            password: body.password,
            created_by: None,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(auth_response(session))))
}

/// `POST /api/login`: authenticate with username + password.
pub async fn login_handler(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let session = state
        .engine
        .accounts()
        .login(&body.username, &body.password)
        .await?;
    Ok(Json(auth_response(session)))
}

/// `POST /api/logout`: revoke the presented token.
pub async fn logout_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> AppResult<StatusCode> {
    state.engine.accounts().logout(&user.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/logout-all`: revoke every session of the caller.
pub async fn logout_all_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> AppResult<Json<RevokedResponse>> {
    let revoked = state.engine.accounts().logout_all(&user.claims).await?;
    Ok(Json(RevokedResponse { revoked }))
}
