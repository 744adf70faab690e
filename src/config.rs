//! Connection and logging configuration.
//!
//! Values come from explicit construction, from the standard libpq environment
//! variables (`PGDATABASE`, `PGUSER`, `PGPASSWORD`, `PGHOST`, `PGPORT`), or from a
//! `.env` file loaded through `dotenv`.

use crate::error::{AppError, Result};
use sqlx::postgres::PgConnectOptions;
use std::env;
use std::fmt;
use std::path::PathBuf;
use tracing::error;

/// Session time zone applied to every new connection unless overridden.
pub const DEFAULT_TIMEZONE: &str = "America/Sao_Paulo";

/// Optional override for the session time zone.
pub const TIMEZONE_VAR: &str = "PGWRAP_TIMEZONE";

/// Optional directory for a daily-rolling log file.
pub const LOG_DIR_VAR: &str = "PGWRAP_LOG_DIR";

/// Everything needed to open one PostgreSQL session.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub database: String,
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub timezone: String,
}

impl ConnectionConfig {
    /// Builds a config with the default session time zone.
    pub fn new(
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            database: database.into(),
            user: user.into(),
            password: password.into(),
            host: host.into(),
            port,
            timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }

    /// Replaces the session time zone.
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    /// Reads the config from the environment, loading `.env` first if present.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Env` if a required variable is missing and
    /// `AppError::Config` if `PGPORT` is not a valid port number.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let database = required_var("PGDATABASE")?;
        let user = required_var("PGUSER")?;
        let password = required_var("PGPASSWORD")?;
        let host = required_var("PGHOST")?;
        let port = parse_port(&required_var("PGPORT")?)?;

        let mut config = Self::new(database, user, password, host, port);
        if let Ok(timezone) = env::var(TIMEZONE_VAR) {
            config.timezone = timezone;
        }
        Ok(config)
    }

    /// Converts into `sqlx` connect options.
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
    }
}

// Keeps the password out of logs.
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("timezone", &self.timezone)
            .finish()
    }
}

/// Logging destinations. Console output is always on; the file sink is optional.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub log_dir: Option<PathBuf>,
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self {
            log_dir: env::var(LOG_DIR_VAR).ok().map(PathBuf::from),
        }
    }
}

pub(crate) fn required_var(name: &str) -> Result<String> {
    env::var(name).map_err(|e| {
        error!("{} environment variable not set: {}", name, e);
        AppError::Env(e)
    })
}

pub(crate) fn parse_port(raw: &str) -> Result<u16> {
    raw.trim()
        .parse::<u16>()
        .map_err(|e| AppError::Config(format!("invalid port '{}': {}", raw, e)))
}
