//! # orgo_api
//!
//! HTTP API library for Orgolink Auth.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use orgo_core::engine::AuthEngine;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{auth, health, password, project_tokens, users, verify};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Token engine.
    pub engine: Arc<AuthEngine>,
    /// API configuration.
    pub config: ApiConfig,
    /// PostgreSQL pool, absent in in-memory mode.
    pub pool: Option<PgPool>,
}

/// Run embedded database migrations.
///
/// Delegates to `orgo_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    orgo_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required). The verify endpoints check the
    // bearer token themselves and answer with a bare status.
    let public = Router::new()
        .route(routes::GET_API_HEALTHY, get(health::healthy))
        .route(routes::POST_API_REGISTER, post(auth::register_handler))
        .route(routes::POST_API_LOGIN, post(auth::login_handler))
        .route(routes::GET_API_VERIFY, get(verify::verify_handler))
        .route(routes::GET_API_VERIFY_ROLE, get(verify::verify_role_handler))
        .route(
            routes::GET_API_VERIFY_PERMISSION,
            get(verify::verify_permission_handler),
        )
        .route(
            routes::POST_API_FORGOT_PASSWORD,
            post(password::forgot_password_handler),
        )
        .route(
            routes::API_RESET_PASSWORD_TOKEN,
            get(password::validate_reset_token_handler).post(password::reset_password_handler),
        );

    // Protected routes (require auth)
    let protected = Router::new()
        .route(routes::POST_API_LOGOUT, post(auth::logout_handler))
        .route(routes::POST_API_LOGOUT_ALL, post(auth::logout_all_handler))
        .route(routes::GET_API_USER, get(users::current_user_handler))
        .route(routes::DELETE_API_DELETE, delete(users::delete_self_handler))
        .route(routes::DELETE_API_DELETE_UID, delete(users::delete_user_handler))
        .route(
            routes::API_PROJECT_TOKENS,
            post(project_tokens::create_project_token_handler)
                .get(project_tokens::list_project_tokens_handler),
        )
        .route(
            routes::DELETE_API_PROJECT_TOKENS_ID,
            delete(project_tokens::revoke_project_token_handler),
        )
        .route(
            routes::API_PROJECT_TOKENS_MY,
            get(project_tokens::list_my_tokens_handler)
                .delete(project_tokens::revoke_my_tokens_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
