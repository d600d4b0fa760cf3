//! # orgo_core
//!
//! Token lifecycle and authorization engine for Orgolink: session tokens
//! with a cache-aside verification path, RBAC evaluation, password resets
//! and project-scoped access tokens.

pub mod auth;
pub mod clock;
pub mod config;
pub mod engine;
pub mod migrate;
pub mod models;
pub mod projects;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
