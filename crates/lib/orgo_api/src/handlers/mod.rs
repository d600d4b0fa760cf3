//! Request handlers.

pub mod auth;
pub mod health;
pub mod password;
pub mod project_tokens;
pub mod users;
pub mod verify;
