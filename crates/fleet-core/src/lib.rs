//! Poll cycle, record joining, and snapshot writing for the fleet backup
//! poller.
//!
//! This crate owns the fetch -> join -> write cycle that runs every poll
//! interval, and the policy that decides what a backend failure means for
//! the loop.
//!
//! # Modules
//!
//! - [`config`] -- [`PollConfig`] timing and fan-out settings.
//! - [`error`] -- [`BackendError`], its [`ErrorKind`] tag, and the
//!   kind-to-[`CyclePolicy`] table.
//! - [`session`] -- [`FleetSession`] trait the backend collaborator
//!   implements, and the [`ApiCall`] request shape.
//! - [`fetch`] -- Builds the per-cycle device listing and the batched
//!   sample multi-call, and decodes their answers.
//! - [`join`] -- Pure merge of entities and samples into snapshots.
//! - [`writer`] -- Per-vehicle append-only output files.
//! - [`stop`] -- [`StopSignal`] shared by the runner and the operator.
//! - [`runner`] -- The poll loop itself.
//!
//! [`PollConfig`]: config::PollConfig
//! [`BackendError`]: error::BackendError
//! [`ErrorKind`]: error::ErrorKind
//! [`CyclePolicy`]: error::CyclePolicy
//! [`FleetSession`]: session::FleetSession
//! [`ApiCall`]: session::ApiCall
//! [`StopSignal`]: stop::StopSignal

pub mod config;
pub mod error;
pub mod fetch;
pub mod join;
pub mod runner;
pub mod session;
pub mod stop;
pub mod writer;
