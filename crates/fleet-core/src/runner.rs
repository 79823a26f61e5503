//! The poll loop: fetch, join, write, wait, repeat.
//!
//! [`PollRunner::run_forever`] drives cycles until the [`StopSignal`] is
//! set or a backend failure's [`CyclePolicy`] says to stop. Nothing is
//! raised to the caller; the loop reports how it ended through
//! [`RunResult`].
//!
//! ```text
//! Idle -> Fetching -> Joining -> Writing -> Waiting -> Fetching ...
//!            |                                 |
//!            +--------- stop requested --------+--> Stopped
//! ```
//!
//! Within a cycle the fetch completes before the join, and the join before
//! any write. The next fetch starts only after every write has settled.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, PollConfig};
use crate::error::{BackendError, CyclePolicy, ErrorKind};
use crate::fetch::fetch_records;
use crate::join::join_snapshots;
use crate::session::FleetSession;
use crate::stop::StopSignal;
use crate::writer::{BatchReport, SnapshotWriter};

/// Why [`PollRunner::run_forever`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEndReason {
    /// The stop signal was observed.
    Cancelled,
    /// A backend failure whose policy is [`CyclePolicy::Stop`].
    Fatal {
        /// Kind of the failure.
        kind: ErrorKind,
        /// The failure's message.
        message: String,
    },
}

/// Summary of a whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// How the loop ended.
    pub end_reason: RunEndReason,
    /// Cycles that fetched, joined, and wrote.
    pub cycles_completed: u64,
    /// Cycles that failed with a recoverable error.
    pub cycles_failed: u64,
}

/// Summary of one completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Vehicles listed by the backend this cycle.
    pub vehicles: usize,
    /// Outcome of the snapshot writes.
    pub writes: BatchReport,
}

/// Result of a single cycle that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The cycle ran to completion.
    Completed(CycleReport),
    /// A stop arrived while fetching; nothing was written.
    Cancelled,
}

/// Runs poll cycles against one authenticated session.
#[derive(Debug)]
pub struct PollRunner<S> {
    session: S,
    writer: SnapshotWriter,
    interval: Duration,
    rate_limit_backoff: Duration,
}

impl<S: FleetSession> PollRunner<S> {
    /// Create a runner for `session` with the given settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` does not validate.
    pub fn new(session: S, config: &PollConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            session,
            writer: SnapshotWriter::from_config(config),
            interval: config.interval,
            rate_limit_backoff: config.rate_limit_backoff,
        })
    }

    /// The session this runner polls.
    pub const fn session(&self) -> &S {
        &self.session
    }

    /// Run one fetch -> join -> write cycle.
    ///
    /// A stop observed while fetching abandons the cycle before anything is
    /// written. Write failures are isolated per vehicle and only show up in
    /// the report.
    ///
    /// # Errors
    ///
    /// Returns the classified [`BackendError`] if fetching fails.
    pub async fn run_cycle(&self, stop: &StopSignal) -> Result<CycleOutcome, BackendError> {
        let fetched = tokio::select! {
            biased;
            () = stop.stopped() => return Ok(CycleOutcome::Cancelled),
            fetched = fetch_records(&self.session) => fetched?,
        };

        let snapshots = join_snapshots(
            &fetched.vehicles,
            &fetched.positions,
            &fetched.odometers,
            Utc::now(),
        );

        let writes = self.writer.write_batch(&snapshots, stop).await;

        Ok(CycleOutcome::Completed(CycleReport {
            vehicles: fetched.vehicles.len(),
            writes,
        }))
    }

    /// Poll until stopped or a fatal backend error.
    ///
    /// After a completed cycle or a transient failure the loop waits the
    /// poll interval; after a rate-limit failure it waits the backoff.
    /// Every wait ends early when `stop` is set.
    pub async fn run_forever(&self, stop: &StopSignal) -> RunResult {
        let mut cycles_completed: u64 = 0;
        let mut cycles_failed: u64 = 0;

        info!(
            interval_secs = self.interval.as_secs(),
            rate_limit_backoff_secs = self.rate_limit_backoff.as_secs(),
            output_dir = %self.writer.output_dir().display(),
            "poll loop starting"
        );

        loop {
            if stop.is_stop_requested() {
                break;
            }

            let (delay, backing_off) = match self.run_cycle(stop).await {
                Ok(CycleOutcome::Completed(report)) => {
                    cycles_completed = cycles_completed.saturating_add(1);
                    info!(
                        cycle = cycles_completed,
                        vehicles = report.vehicles,
                        written = report.writes.written,
                        failed = report.writes.failed,
                        skipped = report.writes.skipped,
                        "backup cycle complete"
                    );
                    (self.interval, false)
                }
                Ok(CycleOutcome::Cancelled) => break,
                Err(e) => {
                    let policy = e.kind.cycle_policy();
                    let Some(delay) = policy.delay(self.interval, self.rate_limit_backoff) else {
                        debug!(kind = %e.kind, "fatal backend error, stopping");
                        return RunResult {
                            end_reason: RunEndReason::Fatal {
                                kind: e.kind,
                                message: e.message,
                            },
                            cycles_completed,
                            cycles_failed,
                        };
                    };
                    cycles_failed = cycles_failed.saturating_add(1);
                    if policy == CyclePolicy::BackOff {
                        warn!(
                            error = %e.message,
                            retry_in_secs = delay.as_secs(),
                            "query limit exceeded, backing off"
                        );
                    } else {
                        warn!(
                            kind = %e.kind,
                            error = %e.message,
                            retry_in_secs = delay.as_secs(),
                            "backend fault, retrying"
                        );
                    }
                    (delay, policy == CyclePolicy::BackOff)
                }
            };

            if !stop.sleep(delay).await {
                break;
            }
            if backing_off {
                info!("restarting backup");
            }
        }

        RunResult {
            end_reason: RunEndReason::Cancelled,
            cycles_completed,
            cycles_failed,
        }
    }
}

/// Log how a run ended.
pub fn log_run_end(result: &RunResult) {
    match &result.end_reason {
        RunEndReason::Cancelled => info!(
            cycles_completed = result.cycles_completed,
            cycles_failed = result.cycles_failed,
            "poll loop stopped"
        ),
        RunEndReason::Fatal { kind, message } => error!(
            kind = %kind,
            error = %message,
            cycles_completed = result.cycles_completed,
            cycles_failed = result.cycles_failed,
            "poll loop terminated by backend error"
        ),
    }
}
