//! Project access token handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use orgo_core::projects::tokens::ProjectTokenRequest;
use uuid::Uuid;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    CreateProjectTokenRequest, CreateProjectTokenResponse, ProjectTokenListResponse,
    RevokedResponse,
};

/// `POST /api/projects/{project_key}/tokens`: mint a project token.
pub async fn create_project_token_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(project_key): Path<String>,
    Json(body): Json<CreateProjectTokenRequest>,
) -> AppResult<(StatusCode, Json<CreateProjectTokenResponse>)> {
    let issued = state
        .engine
        .project_tokens()
        .generate(
            ProjectTokenRequest {
                project_key,
                role: body.role,
                description: body.description,
                ttl_days: body.ttl_days,
            },
            &user.claims,
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateProjectTokenResponse {
            token: issued.token,
            info: issued.record.into(),
        }),
    ))
}

/// `GET /api/projects/{project_key}/tokens`
pub async fn list_project_tokens_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(project_key): Path<String>,
) -> AppResult<Json<ProjectTokenListResponse>> {
    let records = state
        .engine
        .project_tokens()
        .list_for_project(&project_key, &user.claims)
        .await?;
    Ok(Json(ProjectTokenListResponse {
        tokens: records.into_iter().map(Into::into).collect(),
    }))
}

/// `DELETE /api/projects/{project_key}/tokens/{token_id}`
pub async fn revoke_project_token_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((project_key, token_id)): Path<(String, Uuid)>,
) -> AppResult<StatusCode> {
    state
        .engine
        .project_tokens()
        .revoke(&project_key, token_id, &user.claims)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/projects/tokens/my`: tokens the caller minted.
pub async fn list_my_tokens_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> AppResult<Json<ProjectTokenListResponse>> {
    let records = state.engine.project_tokens().list_for_user(&user.claims).await?;
    Ok(Json(ProjectTokenListResponse {
        tokens: records.into_iter().map(Into::into).collect(),
    }))
}

/// `DELETE /api/projects/tokens/my`: revoke every token the caller minted.
pub async fn revoke_my_tokens_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> AppResult<Json<RevokedResponse>> {
    let revoked = state
        .engine
        .project_tokens()
        .revoke_all_for_user(&user.claims)
        .await?;
    Ok(Json(RevokedResponse { revoked }))
}
