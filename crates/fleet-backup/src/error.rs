//! Error types for the backup binary.
//!
//! Backend failures stay as [`fleet_core::error::BackendError`] so their
//! kind survives to the reporting code; this type covers everything that
//! goes wrong before the session exists.

use fleet_core::config::ConfigError;

/// Errors that can occur while starting the backup.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// An environment variable holds an unusable value.
    #[error("config error: {0}")]
    Env(String),

    /// The assembled poll settings are invalid.
    #[error("poll config error: {0}")]
    Poll(#[from] ConfigError),
}
