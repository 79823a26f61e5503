//! Merge of independently fetched record sets into per-vehicle snapshots.
//!
//! Samples are matched to vehicles by identifier, never by position in the
//! result lists. Every listed vehicle yields exactly one snapshot, in
//! listing order, whether or not any sample matched it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use fleet_types::{
    ABSENT_COORDINATE, ABSENT_ODOMETER, OdometerSample, PositionSample, VehicleEntity, VehicleId,
    VehicleSnapshot,
};

/// Join vehicles with their position and odometer samples.
///
/// When several samples share a vehicle, the first one wins. Samples for
/// vehicles not in `vehicles` are dropped. Absent positions become
/// `(0, 0)` and absent odometers become `0`; present odometers are floored.
/// All snapshots carry `captured_at`.
pub fn join_snapshots(
    vehicles: &[VehicleEntity],
    positions: &[PositionSample],
    odometers: &[OdometerSample],
    captured_at: DateTime<Utc>,
) -> Vec<VehicleSnapshot> {
    let mut position_by_vehicle: BTreeMap<&VehicleId, &PositionSample> = BTreeMap::new();
    for sample in positions {
        position_by_vehicle.entry(&sample.vehicle_id).or_insert(sample);
    }

    let mut odometer_by_vehicle: BTreeMap<&VehicleId, &OdometerSample> = BTreeMap::new();
    for sample in odometers {
        odometer_by_vehicle.entry(&sample.vehicle_id).or_insert(sample);
    }

    vehicles
        .iter()
        .map(|vehicle| {
            let position = position_by_vehicle.get(&vehicle.id);
            let odometer = odometer_by_vehicle.get(&vehicle.id);

            VehicleSnapshot {
                vehicle_id: vehicle.id.clone(),
                vin: vehicle.vin.clone(),
                latitude: position.map_or(ABSENT_COORDINATE, |p| p.latitude),
                longitude: position.map_or(ABSENT_COORDINATE, |p| p.longitude),
                odometer: odometer.map_or(ABSENT_ODOMETER, |o| o.distance.floor()),
                captured_at,
            }
        })
        .collect()
}
