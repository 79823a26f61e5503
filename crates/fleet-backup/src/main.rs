//! Vehicle data backup for a fleet telemetry backend.
//!
//! Logs in with the four positional arguments, then polls every vehicle's
//! latest position and odometer on a fixed interval and appends one CSV line
//! per vehicle to `<output_dir>/<vehicle id>.csv`.
//!
//! ```text
//! Authenticate --> [Fetch --> Join --> Write --> Wait] ... --> Stop
//!                     ^                            |
//!                     +----------------------------+
//! ```
//!
//! The operator ends the program with Enter or Ctrl-C. Writes already in
//! flight finish before the program exits.

mod config;
mod error;
mod geotab;
mod operator;

use anyhow::Context;
use fleet_core::error::{BackendError, ErrorKind};
use fleet_core::runner::{PollRunner, log_run_end};
use fleet_core::stop::StopSignal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{BackupConfig, LoginArgs, USAGE};
use crate::geotab::GeotabSession;
use crate::operator::{race_until_stopped, wait_for_operator};

/// Application entry point.
///
/// # Errors
///
/// Returns an error if the environment configuration is invalid.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Parse the account arguments
    let Some(login) = LoginArgs::from_args(std::env::args().skip(1)) else {
        println!("{USAGE}");
        return Ok(());
    };

    // Load configuration from environment
    let config = BackupConfig::from_env().context("failed to load configuration")?;
    info!(
        server = login.server,
        database = login.database,
        output_dir = %config.poll.output_dir.display(),
        interval_secs = config.poll.interval.as_secs(),
        "fleet-backup starting"
    );

    // Log in to the backend
    let session = match GeotabSession::authenticate(&login, config.request_timeout).await {
        Ok(session) => session,
        Err(e) => {
            report_login_failure(&e);
            error!("could not authenticate, end of program");
            return Ok(());
        }
    };

    let runner = PollRunner::new(session, &config.poll).context("invalid poll settings")?;
    let stop = StopSignal::new();
    info!("backup running, press Enter or Ctrl-C to end");

    // Poll until the operator stops us or the backend fails for good
    let result = race_until_stopped(runner.run_forever(&stop), wait_for_operator(), &stop).await;

    log_run_end(&result);
    info!("program ended");
    Ok(())
}

/// Explain a failed login in the operator's terms.
fn report_login_failure(e: &BackendError) {
    match e.kind {
        ErrorKind::InvalidCredentials => error!(error = %e.message, "invalid user"),
        ErrorKind::DatabaseUnavailable => error!(error = %e.message, "database unavailable"),
        ErrorKind::RateLimited => {
            error!(error = %e.message, "user has exceeded the query limit");
        }
        _ => error!(kind = %e.kind, error = %e.message, "failed to authenticate user"),
    }
}
