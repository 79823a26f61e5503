//! Append-only per-vehicle snapshot files.
//!
//! Each vehicle owns `<output dir>/<vehicle id>.csv`. A batch writes many
//! vehicles concurrently (bounded by the configured fan-out) while writes to
//! any single file are serialized by a per-path lock. One vehicle's failure
//! is logged and never affects the rest of the batch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fleet_types::{VehicleId, VehicleSnapshot};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::config::PollConfig;
use crate::stop::StopSignal;

/// Extension of every snapshot file.
pub const FILE_EXTENSION: &str = "csv";

/// Errors writing a single vehicle's snapshot.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// The output directory could not be created.
    #[error("failed to create output directory {}: {source}", .path.display())]
    CreateDir {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The vehicle identifier cannot be used as a file name.
    #[error("vehicle id {vehicle_id:?} is not a safe file name")]
    InvalidFileName {
        /// The rejected identifier.
        vehicle_id: VehicleId,
    },

    /// Opening, appending to, or syncing the file failed.
    #[error("failed to append to {}: {source}", .path.display())]
    Append {
        /// File that could not be written.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

/// Per-batch tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Snapshots durably appended.
    pub written: usize,
    /// Snapshots lost to a write error.
    pub failed: usize,
    /// Snapshots not attempted because a stop was requested.
    pub skipped: usize,
}

enum WriteOutcome {
    Written,
    Failed,
    Skipped,
}

/// Writes snapshots into per-vehicle append-only files.
#[derive(Debug)]
pub struct SnapshotWriter {
    output_dir: PathBuf,
    max_concurrent: usize,
    file_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl SnapshotWriter {
    /// Create a writer rooted at `output_dir`.
    ///
    /// A `max_concurrent` of zero is treated as one.
    pub fn new(output_dir: impl Into<PathBuf>, max_concurrent: usize) -> Self {
        Self {
            output_dir: output_dir.into(),
            max_concurrent: max_concurrent.max(1),
            file_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Create a writer from the poll settings.
    pub fn from_config(config: &PollConfig) -> Self {
        Self::new(config.output_dir.clone(), config.max_concurrent_writes)
    }

    /// The directory holding the snapshot files.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Resolve the file for `vehicle_id`.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::InvalidFileName`] for identifiers that are
    /// empty, relative path components, or contain separators.
    pub fn path_for(&self, vehicle_id: &VehicleId) -> Result<PathBuf, WriteError> {
        let id = vehicle_id.as_str();
        let unsafe_name = id.is_empty()
            || id == "."
            || id == ".."
            || id.contains(['/', '\\', '\0']);
        if unsafe_name {
            return Err(WriteError::InvalidFileName {
                vehicle_id: vehicle_id.clone(),
            });
        }
        Ok(self.output_dir.join(format!("{id}.{FILE_EXTENSION}")))
    }

    /// Create the output directory if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::CreateDir`] if creation fails.
    pub async fn ensure_output_dir(&self) -> Result<(), WriteError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| WriteError::CreateDir {
                path: self.output_dir.clone(),
                source,
            })
    }

    /// Append one snapshot line to its vehicle's file and sync it to disk.
    ///
    /// The output directory must already exist. Returns the file written.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError`] if the file name is unsafe or the append
    /// fails.
    pub async fn write(&self, snapshot: &VehicleSnapshot) -> Result<PathBuf, WriteError> {
        let path = self.path_for(&snapshot.vehicle_id)?;
        let lock = self.file_lock(&path).await;
        let _guard = lock.lock().await;

        let mut line = snapshot.to_csv_line();
        line.push('\n');

        append_line(&path, &line)
            .await
            .map_err(|source| WriteError::Append {
                path: path.clone(),
                source,
            })?;

        Ok(path)
    }

    /// Write a cycle's snapshots, at most `max_concurrent` at a time, and
    /// wait for every write to settle.
    ///
    /// Writes that have not started when `stop` is requested are skipped;
    /// writes already in flight finish so no partial line is left behind.
    pub async fn write_batch(
        &self,
        snapshots: &[VehicleSnapshot],
        stop: &StopSignal,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        if snapshots.is_empty() {
            return report;
        }

        if let Err(e) = self.ensure_output_dir().await {
            error!(error = %e, "cannot write snapshots this cycle");
            report.failed = snapshots.len();
            return report;
        }

        let outcomes: Vec<WriteOutcome> = futures::stream::iter(snapshots)
            .map(|snapshot| self.write_one(snapshot, stop))
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                WriteOutcome::Written => report.written = report.written.saturating_add(1),
                WriteOutcome::Failed => report.failed = report.failed.saturating_add(1),
                WriteOutcome::Skipped => report.skipped = report.skipped.saturating_add(1),
            }
        }
        self.release_idle_locks().await;
        report
    }

    async fn write_one(&self, snapshot: &VehicleSnapshot, stop: &StopSignal) -> WriteOutcome {
        if stop.is_stop_requested() {
            return WriteOutcome::Skipped;
        }
        match self.write(snapshot).await {
            Ok(path) => {
                debug!(
                    vehicle_id = %snapshot.vehicle_id,
                    path = %path.display(),
                    "snapshot appended"
                );
                WriteOutcome::Written
            }
            Err(e) => {
                warn!(
                    vehicle_id = %snapshot.vehicle_id,
                    error = %e,
                    "snapshot write failed, vehicle skipped this cycle"
                );
                WriteOutcome::Failed
            }
        }
    }

    async fn file_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.file_locks.lock().await;
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }

    /// Drop locks no write is holding, so vehicles that leave the fleet do
    /// not keep an entry forever.
    async fn release_idle_locks(&self) {
        let mut locks = self.file_locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

async fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    file.sync_data().await
}
