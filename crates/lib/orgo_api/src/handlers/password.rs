//! Password reset handlers. Delivering the token to the user is out of band.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use crate::AppState;
use crate::error::AppResult;
use crate::models::{
    ForgotPasswordRequest, ForgotPasswordResponse, ResetPasswordRequest, ResetTokenStatus,
};

/// `POST /api/forgot-password`
pub async fn forgot_password_handler(
    State(state): State<AppState>,
    Json(body): Json<ForgotPasswordRequest>,
) -> AppResult<(StatusCode, Json<ForgotPasswordResponse>)> {
    let ticket = state.engine.password_reset().initiate(&body.email).await?;
    let reset_token = state
        .config
        .auth
        .expose_reset_token
        .then_some(ticket.token);
    Ok((
        StatusCode::ACCEPTED,
        Json(ForgotPasswordResponse {
            message: "Password reset initiated".into(),
            expires_at: ticket.expires_at,
            reset_token,
        }),
    ))
}

/// `GET /api/reset-password/{token}`: whether the token can still be used.
pub async fn validate_reset_token_handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<ResetTokenStatus>> {
    let valid = state.engine.password_reset().validate(&token).await?;
    Ok(Json(ResetTokenStatus { valid }))
}

/// `POST /api/reset-password/{token}`
pub async fn reset_password_handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(body): Json<ResetPasswordRequest>,
) -> AppResult<StatusCode> {
    state
        .engine
        .password_reset()
        .reset(&token, &body.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
