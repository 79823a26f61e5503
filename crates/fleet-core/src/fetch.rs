//! Per-cycle backend reads.
//!
//! A cycle costs exactly two round trips: one `Get Device` listing the
//! fleet, then one multi-call carrying, for every vehicle, a position
//! request and an odometer request. The multi-call is laid out as
//!
//! ```text
//! [position(v0), odometer(v0), position(v1), odometer(v1), ...]
//! ```
//!
//! so each answer is attributed to the vehicle it was requested for.

use chrono::{DateTime, Utc};
use fleet_types::{OdometerSample, PositionSample, VehicleEntity, VehicleId};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::BackendError;
use crate::session::{ApiCall, FleetSession};

/// Backend type holding vehicle devices.
pub const DEVICE_TYPE: &str = "Device";

/// Backend type holding the latest position/status of a device.
pub const STATUS_INFO_TYPE: &str = "DeviceStatusInfo";

/// Backend type holding diagnostic readings.
pub const STATUS_DATA_TYPE: &str = "StatusData";

/// Diagnostic carrying the adjusted odometer reading.
pub const ODOMETER_DIAGNOSTIC: &str = "DiagnosticOdometerAdjustmentId";

/// A `fromDate` past any real reading, which makes the backend return only
/// the latest value.
pub const LATEST_READING_FROM_DATE: &str = "9999-12-31T23:59:59.999Z";

/// Everything one cycle read from the backend, before joining.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedRecords {
    /// Vehicles in backend order.
    pub vehicles: Vec<VehicleEntity>,
    /// At most one position per vehicle.
    pub positions: Vec<PositionSample>,
    /// At most one odometer reading per vehicle.
    pub odometers: Vec<OdometerSample>,
}

// ---------------------------------------------------------------------------
// Wire records
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceRecord {
    id: String,
    name: Option<String>,
    vehicle_identification_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeviceRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusInfoRecord {
    latitude: Option<f64>,
    longitude: Option<f64>,
    date_time: Option<DateTime<Utc>>,
    device: Option<DeviceRef>,
}

#[derive(Debug, Deserialize)]
struct StatusDataRecord {
    data: Option<f64>,
    device: Option<DeviceRef>,
}

// ---------------------------------------------------------------------------
// Request building
// ---------------------------------------------------------------------------

/// The call listing every vehicle in the fleet.
pub fn devices_call() -> ApiCall {
    ApiCall::get(DEVICE_TYPE, Map::new())
}

/// The call fetching a vehicle's latest position.
pub fn position_call(vehicle_id: &VehicleId) -> ApiCall {
    ApiCall::get(
        STATUS_INFO_TYPE,
        object(json!({
            "search": {
                "deviceSearch": { "id": vehicle_id }
            },
            "propertySelector": {
                "fields": ["latitude", "longitude", "dateTime", "device"],
                "isIncluded": true
            }
        })),
    )
}

/// The call fetching a vehicle's latest odometer reading.
pub fn odometer_call(vehicle_id: &VehicleId) -> ApiCall {
    ApiCall::get(
        STATUS_DATA_TYPE,
        object(json!({
            "search": {
                "deviceSearch": { "id": vehicle_id },
                "diagnosticSearch": { "id": ODOMETER_DIAGNOSTIC },
                "fromDate": LATEST_READING_FROM_DATE
            },
            "propertySelector": {
                "fields": ["data", "dateTime", "device"],
                "isIncluded": true
            }
        })),
    )
}

/// The batched sample calls for `vehicles`, interleaved position/odometer
/// in vehicle order.
pub fn sample_calls(vehicles: &[VehicleEntity]) -> Vec<ApiCall> {
    vehicles
        .iter()
        .flat_map(|v| [position_call(&v.id), odometer_call(&v.id)])
        .collect()
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

// ---------------------------------------------------------------------------
// Response decoding
// ---------------------------------------------------------------------------

/// Decode the device listing.
///
/// Commas and control characters are stripped from VINs so they cannot
/// break a snapshot line; a VIN left blank is treated as absent.
///
/// # Errors
///
/// Returns a serialization error if the result is not a device list.
pub fn decode_vehicles(result: &Value) -> Result<Vec<VehicleEntity>, BackendError> {
    let records = Option::<Vec<DeviceRecord>>::deserialize(result)?.unwrap_or_default();
    Ok(records
        .into_iter()
        .map(|r| VehicleEntity {
            vin: r.vehicle_identification_number.as_deref().and_then(clean_vin),
            name: r.name.unwrap_or_default(),
            id: VehicleId::new(r.id),
        })
        .collect())
}

fn clean_vin(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != ',' && !c.is_control())
        .collect();
    let trimmed = cleaned.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

/// Decode the multi-call answer produced for [`sample_calls`].
///
/// Only the first record of each result list is used. Records that omit
/// their device reference belong to the vehicle the call was made for;
/// status records without coordinates count as no fix.
///
/// # Errors
///
/// Returns a serialization error if the number of results does not match
/// the request layout or a result cannot be decoded.
pub fn decode_samples(
    vehicles: &[VehicleEntity],
    results: &[Value],
) -> Result<(Vec<PositionSample>, Vec<OdometerSample>), BackendError> {
    let expected = vehicles.len().saturating_mul(2);
    if results.len() != expected {
        return Err(BackendError::serialization(format!(
            "multi-call returned {} results for {expected} calls",
            results.len()
        )));
    }

    let mut positions = Vec::new();
    let mut odometers = Vec::new();

    for (vehicle, pair) in vehicles.iter().zip(results.chunks_exact(2)) {
        let [position, odometer] = pair else {
            continue;
        };

        let status = Option::<Vec<StatusInfoRecord>>::deserialize(position)?
            .and_then(|records| records.into_iter().next());
        if let Some(record) = status
            && let (Some(latitude), Some(longitude)) = (record.latitude, record.longitude)
        {
            positions.push(PositionSample {
                vehicle_id: owner(record.device, &vehicle.id),
                latitude,
                longitude,
                sampled_at: record.date_time,
            });
        }

        let reading = Option::<Vec<StatusDataRecord>>::deserialize(odometer)?
            .and_then(|records| records.into_iter().next());
        if let Some(record) = reading
            && let Some(distance) = record.data
        {
            odometers.push(OdometerSample {
                vehicle_id: owner(record.device, &vehicle.id),
                distance,
            });
        }
    }

    Ok((positions, odometers))
}

fn owner(device: Option<DeviceRef>, requested_for: &VehicleId) -> VehicleId {
    device.map_or_else(|| requested_for.clone(), |d| VehicleId::new(d.id))
}

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

/// Read the fleet and its latest samples in two round trips.
///
/// An empty fleet skips the multi-call.
///
/// # Errors
///
/// Propagates the session's classified [`BackendError`] and decoding
/// failures.
pub async fn fetch_records<S: FleetSession>(session: &S) -> Result<FetchedRecords, BackendError> {
    let listing = session.call(&devices_call()).await?;
    let vehicles = decode_vehicles(&listing)?;
    debug!(vehicle_count = vehicles.len(), "device listing fetched");

    if vehicles.is_empty() {
        return Ok(FetchedRecords::default());
    }

    let calls = sample_calls(&vehicles);
    let results = session.multi_call(&calls).await?;
    let (positions, odometers) = decode_samples(&vehicles, &results)?;
    debug!(
        call_count = calls.len(),
        position_count = positions.len(),
        odometer_count = odometers.len(),
        "sample multi-call fetched"
    );

    Ok(FetchedRecords {
        vehicles,
        positions,
        odometers,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn vehicle(id: &str) -> VehicleEntity {
        VehicleEntity {
            id: VehicleId::from(id),
            name: format!("Truck {id}"),
            vin: None,
        }
    }

    #[test]
    fn sample_calls_interleave_in_vehicle_order() {
        let calls = sample_calls(&[vehicle("b1"), vehicle("b2")]);

        assert_eq!(calls.len(), 4);
        let types: Vec<&str> = calls.iter().map(|c| c.type_name.as_str()).collect();
        assert_eq!(
            types,
            [STATUS_INFO_TYPE, STATUS_DATA_TYPE, STATUS_INFO_TYPE, STATUS_DATA_TYPE]
        );
        assert_eq!(calls[2].params["search"]["deviceSearch"]["id"], "b2");
        assert_eq!(
            calls[3].params["search"]["diagnosticSearch"]["id"],
            ODOMETER_DIAGNOSTIC
        );
        assert_eq!(
            calls[3].params["search"]["fromDate"],
            LATEST_READING_FROM_DATE
        );
    }

    #[test]
    fn devices_call_has_no_search() {
        let call = devices_call();
        assert_eq!(call.method, "Get");
        assert_eq!(call.type_name, DEVICE_TYPE);
        assert!(call.params.is_empty());
    }

    #[test]
    fn decode_vehicles_reads_vin_and_drops_blank_ones() {
        let listing = json!([
            { "id": "b1", "name": "Truck 1", "vehicleIdentificationNumber": "1HGCM82633A004352" },
            { "id": "b2", "name": "Truck 2", "vehicleIdentificationNumber": "  " },
            { "id": "b3" }
        ]);

        let vehicles = decode_vehicles(&listing).unwrap();

        assert_eq!(vehicles.len(), 3);
        assert_eq!(vehicles[0].vin.as_deref(), Some("1HGCM82633A004352"));
        assert_eq!(vehicles[1].vin, None);
        assert_eq!(vehicles[2].name, "");
    }

    #[test]
    fn decode_vehicles_strips_separators_from_vin() {
        let vehicles = decode_vehicles(&json!([
            { "id": "b1", "vehicleIdentificationNumber": "1HG,CM82\n633A" },
            { "id": "b2", "vehicleIdentificationNumber": ",\r\n" }
        ]))
        .unwrap();

        assert_eq!(vehicles[0].vin.as_deref(), Some("1HGCM82633A"));
        assert_eq!(vehicles[1].vin, None);
    }

    #[test]
    fn decode_vehicles_rejects_non_list() {
        let err = decode_vehicles(&json!({ "id": "b1" })).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Serialization);
    }

    #[test]
    fn decode_samples_attributes_answers_to_requested_vehicle() {
        let vehicles = [vehicle("b1"), vehicle("b2")];
        let results = [
            json!([{ "latitude": 45.0, "longitude": -75.0, "dateTime": "2026-01-02T03:04:05Z" }]),
            json!([{ "data": 1234.9 }]),
            json!([]),
            json!([{ "data": 10.0, "device": { "id": "b2" } }, { "data": 99.0 }]),
        ];

        let (positions, odometers) = decode_samples(&vehicles, &results).unwrap();

        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].vehicle_id.as_str(), "b1");
        assert!(positions[0].sampled_at.is_some());
        assert_eq!(odometers.len(), 2);
        assert_eq!(odometers[0].vehicle_id.as_str(), "b1");
        assert_eq!(odometers[1].vehicle_id.as_str(), "b2");
        assert!((odometers[1].distance - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn decode_samples_treats_missing_coordinates_as_no_fix() {
        let results = [json!([{ "latitude": 45.0 }]), json!(null)];

        let (positions, odometers) = decode_samples(&[vehicle("b1")], &results).unwrap();

        assert!(positions.is_empty());
        assert!(odometers.is_empty());
    }

    #[test]
    fn decode_samples_rejects_length_mismatch() {
        let results = [json!([])];
        let err = decode_samples(&[vehicle("b1")], &results).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Serialization);
    }
}
