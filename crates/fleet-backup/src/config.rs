//! Command-line arguments and environment configuration.
//!
//! The four positional arguments identify the backend account. Everything
//! else has a default and can be tuned through environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use fleet_core::config::{
    DEFAULT_MAX_CONCURRENT_WRITES, DEFAULT_OUTPUT_DIR, DEFAULT_POLL_INTERVAL,
    DEFAULT_RATE_LIMIT_BACKOFF, PollConfig,
};

use crate::error::AppError;

/// Usage text printed when the argument count is wrong.
pub const USAGE: &str = "
 Command line parameters:
 fleet-backup <server> <database> <username> <password>

 Example: fleet-backup my.geotab.com G560 fleet.admin@example.com 's3cret'

 server     - Server host name (Example: my.geotab.com)
 database   - Database name (Example: G560)
 username   - Backend user name
 password   - Backend password
";

/// Default per-request HTTP timeout, in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Account the backup logs in as.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginArgs {
    /// Backend host name.
    pub server: String,
    /// Database (tenant) name.
    pub database: String,
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl core::fmt::Debug for LoginArgs {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LoginArgs")
            .field("server", &self.server)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl LoginArgs {
    /// Parse the positional arguments (program name already skipped).
    ///
    /// Returns `None` unless there are exactly four.
    pub fn from_args<I>(args: I) -> Option<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let server = args.next()?;
        let database = args.next()?;
        let username = args.next()?;
        let password = args.next()?;
        if args.next().is_some() {
            return None;
        }
        Some(Self {
            server,
            database,
            username,
            password,
        })
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Poll loop and writer settings.
    pub poll: PollConfig,
    /// Timeout applied to every HTTP request to the backend.
    pub request_timeout: Duration,
}

impl BackupConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional variables:
    /// - `BACKUP_POLL_INTERVAL_SECS` -- delay between cycles (default 10)
    /// - `BACKUP_RATE_LIMIT_BACKOFF_SECS` -- delay after a rate-limit error (default 60)
    /// - `BACKUP_OUTPUT_DIR` -- snapshot directory (default `VehiclesBackup`)
    /// - `BACKUP_MAX_CONCURRENT_WRITES` -- write fan-out (default 16)
    /// - `BACKUP_REQUEST_TIMEOUT_SECS` -- HTTP timeout (default 30)
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if a variable cannot be parsed or the resulting
    /// settings are invalid.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`BackupConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let interval_secs = parse_or(
            &lookup,
            "BACKUP_POLL_INTERVAL_SECS",
            DEFAULT_POLL_INTERVAL.as_secs(),
        )?;
        let backoff_secs = parse_or(
            &lookup,
            "BACKUP_RATE_LIMIT_BACKOFF_SECS",
            DEFAULT_RATE_LIMIT_BACKOFF.as_secs(),
        )?;
        let max_concurrent_writes = parse_or(
            &lookup,
            "BACKUP_MAX_CONCURRENT_WRITES",
            DEFAULT_MAX_CONCURRENT_WRITES,
        )?;
        let request_timeout_secs = parse_or(
            &lookup,
            "BACKUP_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;
        let output_dir = lookup("BACKUP_OUTPUT_DIR")
            .map_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR), PathBuf::from);

        let poll = PollConfig {
            interval: Duration::from_secs(interval_secs),
            rate_limit_backoff: Duration::from_secs(backoff_secs),
            output_dir,
            max_concurrent_writes,
        };
        poll.validate()?;

        Ok(Self {
            poll,
            request_timeout: Duration::from_secs(request_timeout_secs),
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: core::fmt::Display,
{
    lookup(name).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .map_err(|e| AppError::Env(format!("invalid {name}: {e}")))
    })
}
