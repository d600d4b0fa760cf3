//! Current-user and account deletion handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use uuid::Uuid;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::UserResponse;

/// `GET /api/user`
pub async fn current_user_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> AppResult<Json<UserResponse>> {
    let principal = state.engine.accounts().current_user(&user.claims).await?;
    Ok(Json(principal.into()))
}

/// `DELETE /api/delete`: delete the caller's own account.
pub async fn delete_self_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> AppResult<StatusCode> {
    state.engine.accounts().delete_own_account(&user.claims).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/delete/{uid}`: delete another account (`MANAGE_USERS`).
pub async fn delete_user_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(uid): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.engine.accounts().delete_user(uid, &user.claims).await?;
    Ok(StatusCode::NO_CONTENT)
}
