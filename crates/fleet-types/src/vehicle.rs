//! Vehicle entities, telemetry samples, and merged snapshots.
//!
//! The three input record sets ([`VehicleEntity`], [`PositionSample`],
//! [`OdometerSample`]) are fetched independently each cycle and only live
//! for that cycle. A [`VehicleSnapshot`] is their merged, per-vehicle
//! projection and exists only long enough to be rendered into an output
//! line.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::VehicleId;

/// Latitude/longitude written when a vehicle has no recent fix.
pub const ABSENT_COORDINATE: f64 = 0.0;

/// Odometer value written when a vehicle has no reading.
pub const ABSENT_ODOMETER: f64 = 0.0;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// A tracked vehicle as listed by the backend for the current cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleEntity {
    /// Stable backend identifier.
    pub id: VehicleId,
    /// Display name as configured in the backend.
    pub name: String,
    /// Vehicle identification number, when the device reports one.
    pub vin: Option<String>,
}

/// Latest known position of a vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    /// The vehicle this fix belongs to.
    pub vehicle_id: VehicleId,
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// When the device recorded the fix, if the backend returned it.
    pub sampled_at: Option<DateTime<Utc>>,
}

/// Latest odometer reading of a vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdometerSample {
    /// The vehicle this reading belongs to.
    pub vehicle_id: VehicleId,
    /// Raw distance reading as reported by the backend.
    pub distance: f64,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// One vehicle's merged state for a single poll cycle.
///
/// Missing samples are already replaced by [`ABSENT_COORDINATE`] and
/// [`ABSENT_ODOMETER`]; `odometer` is floored to a whole unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    /// The vehicle this snapshot describes.
    pub vehicle_id: VehicleId,
    /// Vehicle identification number, if known.
    pub vin: Option<String>,
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Whole-unit odometer reading.
    pub odometer: f64,
    /// The moment the cycle joined this snapshot (not the sample time).
    pub captured_at: DateTime<Utc>,
}

impl VehicleSnapshot {
    /// Render the snapshot as one comma-separated output line, without the
    /// trailing newline.
    ///
    /// Field order: identifier, VIN (empty when absent), latitude,
    /// longitude, odometer, capture timestamp (RFC 3339, UTC).
    pub fn to_csv_line(&self) -> String {
        format!(
            "{},{},{},{},{:.0},{}",
            self.vehicle_id,
            self.vin.as_deref().unwrap_or_default(),
            self.latitude,
            self.longitude,
            self.odometer,
            self.captured_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        )
    }
}
