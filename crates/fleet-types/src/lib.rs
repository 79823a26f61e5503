//! Shared type definitions for the fleet backup poller.
//!
//! Every crate in the workspace speaks in terms of these types: the backend
//! session decodes into them, the joiner merges them, and the writer renders
//! them.
//!
//! # Modules
//!
//! - [`ids`] -- Opaque vehicle identifier newtype
//! - [`vehicle`] -- Entities, samples, and the merged per-cycle snapshot

pub mod ids;
pub mod vehicle;

pub use ids::VehicleId;
pub use vehicle::{
    ABSENT_COORDINATE, ABSENT_ODOMETER, OdometerSample, PositionSample, VehicleEntity,
    VehicleSnapshot,
};
