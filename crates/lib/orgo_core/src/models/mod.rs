//! Domain models shared across the token engine.

pub mod auth;
