//! Poll loop settings.
//!
//! The binary fills these from the environment; tests build them directly.

use std::path::PathBuf;
use std::time::Duration;

/// Default delay between the end of one cycle and the start of the next.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default delay after the backend reports a rate-limit error.
pub const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(60);

/// Default output directory, relative to the working directory.
pub const DEFAULT_OUTPUT_DIR: &str = "VehiclesBackup";

/// Default bound on concurrent per-vehicle file writes.
pub const DEFAULT_MAX_CONCURRENT_WRITES: usize = 16;

/// Errors from an invalid [`PollConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The write fan-out must allow at least one write.
    #[error("max_concurrent_writes must be at least 1")]
    ZeroWriteConcurrency,

    /// The output directory path is empty.
    #[error("output directory must not be empty")]
    EmptyOutputDir,

    /// A zero poll interval would retry the backend without pause.
    #[error("poll interval must be greater than zero")]
    ZeroInterval,

    /// A zero rate-limit backoff would ignore the backend's query limit.
    #[error("rate-limit backoff must be greater than zero")]
    ZeroBackoff,
}

/// Settings for the poll loop and its snapshot writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Wait between cycles, and after transient failures.
    pub interval: Duration,
    /// Wait after a rate-limit failure.
    pub rate_limit_backoff: Duration,
    /// Directory holding one `<vehicle id>.csv` file per vehicle.
    pub output_dir: PathBuf,
    /// Maximum number of vehicle files written at once.
    pub max_concurrent_writes: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            rate_limit_backoff: DEFAULT_RATE_LIMIT_BACKOFF,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            max_concurrent_writes: DEFAULT_MAX_CONCURRENT_WRITES,
        }
    }
}

impl PollConfig {
    /// Check the settings for values the loop cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_writes == 0 {
            return Err(ConfigError::ZeroWriteConcurrency);
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyOutputDir);
        }
        if self.interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.rate_limit_backoff.is_zero() {
            return Err(ConfigError::ZeroBackoff);
        }
        Ok(())
    }
}
