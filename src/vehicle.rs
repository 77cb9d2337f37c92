//! Normalized vehicle positions extracted from a decoded feed.

use serde::Serialize;

use crate::gtfs_rt::{FeedEntity, FeedMessage};

/// One vehicle's position from a single poll cycle.
///
/// Coordinates are stored `lat`, `lon`; GeoJSON output reverses them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleRecord {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    /// Bearing in degrees clockwise from north, 0 when the feed carries none.
    pub heading: f64,
    pub route_id: Option<String>,
    pub direction_id: Option<String>,
}

impl VehicleRecord {
    /// Builds a record from an entity whose vehicle has both coordinates,
    /// and both are finite.
    ///
    /// The id is the vehicle descriptor id when present, else the entity id.
    pub fn from_entity(entity: &FeedEntity) -> Option<Self> {
        let vehicle = entity.vehicle.as_ref()?;
        let position = vehicle.position.as_ref()?;
        let (lat, lon) = (position.latitude?, position.longitude?);
        if !lat.is_finite() || !lon.is_finite() {
            return None;
        }

        let id = vehicle
            .vehicle
            .as_ref()
            .and_then(|v| v.id.as_deref())
            .filter(|id| !id.is_empty())
            .unwrap_or(entity.id.as_str())
            .to_string();

        let trip = vehicle.trip.as_ref();
        let route_id = trip
            .and_then(|t| t.route_id.clone())
            .filter(|r| !r.is_empty());
        let direction_id = trip.and_then(|t| t.direction_id).map(|d| d.to_string());

        Some(VehicleRecord {
            id,
            lat: f64::from(lat),
            lon: f64::from(lon),
            heading: position
                .bearing
                .filter(|b| b.is_finite())
                .map_or(0.0, f64::from),
            route_id,
            direction_id,
        })
    }
}

/// Extracts a record for every positioned vehicle in `feed`, in entity order.
///
/// Entities without a vehicle, without a position, or missing either
/// coordinate are dropped, as are non-finite coordinates. Duplicate ids are kept as-is.
pub fn records_from_feed(feed: &FeedMessage) -> Vec<VehicleRecord> {
    feed.entity
        .iter()
        .filter_map(VehicleRecord::from_entity)
        .collect()
}
