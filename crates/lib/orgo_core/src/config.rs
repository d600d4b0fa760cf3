//! Auth engine settings.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::auth::jwt::resolve_jwt_secret;
use crate::auth::rbac::RoleTable;

/// Upper bound for session and password reset TTLs: one year.
pub const MAX_TTL_SECS: i64 = 365 * 24 * 60 * 60;

/// How account deletion is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteScheme {
    /// Mark the principal deleted and keep the row.
    #[default]
    Soft,
    /// Remove the principal row.
    Hard,
}

impl FromStr for DeleteScheme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "soft" => Ok(DeleteScheme::Soft),
            "hard" => Ok(DeleteScheme::Hard),
            _ => Err(ConfigError::InvalidValue {
                var: "ORGO_DELETE_SCHEME",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("failed to read roles file {path}: {source}")]
    RolesFile {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid roles file: {0}")]
    RolesYaml(#[from] serde_yaml::Error),
}

/// Process-wide auth settings, loaded once at startup.
#[derive(Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub session_ttl: Duration,
    pub password_reset_ttl: Duration,
    pub delete_scheme: DeleteScheme,
    pub store_timeout: StdDuration,
    pub cache_timeout: StdDuration,
    /// Return reset tokens in the forgot-password response. Test deployments only.
    pub expose_reset_token: bool,
    pub roles: Arc<RoleTable>,
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("jwt_secret", &"<redacted>")
            .field("session_ttl", &self.session_ttl)
            .field("password_reset_ttl", &self.password_reset_ttl)
            .field("delete_scheme", &self.delete_scheme)
            .field("store_timeout", &self.store_timeout)
            .field("cache_timeout", &self.cache_timeout)
            .field("expose_reset_token", &self.expose_reset_token)
            .field("roles", &self.roles.roles().len())
            .finish()
    }
}

impl AuthSettings {
    /// Defaults with the given signing secret.
    pub fn with_secret(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            session_ttl: Duration::hours(24),
            password_reset_ttl: Duration::hours(1),
            delete_scheme: DeleteScheme::Soft,
            store_timeout: StdDuration::from_secs(5),
            cache_timeout: StdDuration::from_millis(250),
            expose_reset_token: false,
            roles: Arc::new(RoleTable::builtin()),
        }
    }

    /// Reads settings from environment variables.
    ///
    /// | Variable                        | Default                        |
    /// |---------------------------------|--------------------------------|
    /// | `JWT_SECRET` / `AUTH_SECRET`    | generated & persisted to file  |
    /// | `ORGO_SESSION_TTL_SECS`         | `86400`                        |
    /// | `ORGO_PASSWORD_RESET_TTL_SECS`  | `3600`                         |
    /// | `ORGO_DELETE_SCHEME`            | `soft`                         |
    /// | `ORGO_STORE_TIMEOUT_MS`         | `5000`                         |
    /// | `ORGO_CACHE_TIMEOUT_MS`         | `250`                          |
    /// | `ORGO_EXPOSE_RESET_TOKEN`       | `false`                        |
    /// | `ORGO_ROLES_FILE`               | built-in USER / ADMIN table    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(resolve_jwt_secret(), |name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup<F>(jwt_secret: String, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::with_secret(jwt_secret);
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("ORGO_SESSION_TTL_SECS") {
            settings.session_ttl = parse_ttl("ORGO_SESSION_TTL_SECS", &v)?;
        }
        if let Some(v) = var("ORGO_PASSWORD_RESET_TTL_SECS") {
            settings.password_reset_ttl = parse_ttl("ORGO_PASSWORD_RESET_TTL_SECS", &v)?;
        }
        if let Some(v) = var("ORGO_DELETE_SCHEME") {
            settings.delete_scheme = v.parse()?;
        }
        if let Some(v) = var("ORGO_STORE_TIMEOUT_MS") {
            settings.store_timeout =
                StdDuration::from_millis(parse_positive("ORGO_STORE_TIMEOUT_MS", &v)? as u64);
        }
        if let Some(v) = var("ORGO_CACHE_TIMEOUT_MS") {
            settings.cache_timeout =
                StdDuration::from_millis(parse_positive("ORGO_CACHE_TIMEOUT_MS", &v)? as u64);
        }
        if let Some(v) = var("ORGO_EXPOSE_RESET_TOKEN") {
            settings.expose_reset_token = matches!(v.trim(), "1" | "true" | "yes");
        }
        if let Some(path) = var("ORGO_ROLES_FILE") {
            let doc = std::fs::read_to_string(&path).map_err(|source| ConfigError::RolesFile {
                path: path.clone(),
                source,
            })?;
            settings.roles = Arc::new(RoleTable::from_yaml(&doc)?);
        }
        Ok(settings)
    }
}

/// A TTL in seconds, at most [`MAX_TTL_SECS`].
fn parse_ttl(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let secs = parse_positive(var, value)?;
    if secs > MAX_TTL_SECS {
        return Err(ConfigError::InvalidValue {
            var,
            value: value.to_string(),
        });
    }
    Duration::try_seconds(secs).ok_or_else(|| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
    })
}

fn parse_positive(var: &'static str, value: &str) -> Result<i64, ConfigError> {
    match value.trim().parse::<i64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: value.to_string(),
        }),
    }
}
