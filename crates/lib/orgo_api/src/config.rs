//! API server configuration.

use orgo_core::config::{AuthSettings, ConfigError};

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// Redis URL for the token cache. In-process cache when unset.
    pub redis_url: Option<String>,
    /// Token engine settings.
    pub auth: AuthSettings,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable           | Default                                     |
    /// |--------------------|---------------------------------------------|
    /// | `BIND_ADDR`        | `127.0.0.1:3100`                            |
    /// | `DATABASE_URL`     | `postgres://localhost:5432/orgolink`        |
    /// | `REDIS_URL`        | unset                                       |
    ///
    /// Auth settings are read by [`AuthSettings::from_env`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3100".into()),
            pg_connection_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/orgolink".into()),
            redis_url: std::env::var("REDIS_URL").ok().filter(|u| !u.is_empty()),
            auth: AuthSettings::from_env()?,
        })
    }
}
