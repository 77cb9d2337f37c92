//! GeoJSON views of vehicle snapshots and route shapes.
//!
//! Inputs store coordinates as `(lat, lon)`; GeoJSON positions are
//! `[lon, lat]`, so every projection here swaps them.

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use serde_json::json;

use crate::schedule::{LatLon, ScheduleIndex};
use crate::vehicle::VehicleRecord;

/// Eight-point compass label for a bearing in degrees.
///
/// Sectors are 45° wide and centred on each point, so north covers
/// `[337.5, 22.5)`. Negative and >360 bearings wrap.
pub fn compass_label(heading: f64) -> &'static str {
    let angle = heading.rem_euclid(360.0);
    match angle {
        a if !(22.5..337.5).contains(&a) => "north",
        a if a < 67.5 => "northeast",
        a if a < 112.5 => "east",
        a if a < 157.5 => "southeast",
        a if a < 202.5 => "south",
        a if a < 247.5 => "southwest",
        a if a < 292.5 => "west",
        _ => "northwest",
    }
}

fn feature(geometry: Value, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geometry)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn collection(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// A Point feature at `[lon, lat]` carrying the record's fields verbatim.
pub fn vehicle_feature(record: &VehicleRecord) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("id".to_string(), json!(record.id));
    properties.insert("route".to_string(), json!(record.route_id));
    properties.insert("direction".to_string(), json!(record.direction_id));
    properties.insert("heading".to_string(), json!(record.heading));
    properties.insert("compass".to_string(), json!(compass_label(record.heading)));

    feature(Value::Point(vec![record.lon, record.lat]), properties)
}

/// One Point feature per record, in input order.
pub fn vehicle_feature_collection(records: &[VehicleRecord]) -> FeatureCollection {
    collection(records.iter().map(vehicle_feature).collect())
}

/// The route's polyline as a single LineString feature.
///
/// Unknown routes give an empty collection rather than an error. When
/// `direction` is absent or not drawn for this route, the route's first
/// direction (lexicographic) is used and reported in the `direction` property.
pub fn route_feature_collection(
    index: &ScheduleIndex,
    route_id: &str,
    direction: Option<&str>,
) -> FeatureCollection {
    let Some((direction_id, points)) = index.resolve(route_id, direction) else {
        return collection(Vec::new());
    };

    let mut properties = JsonObject::new();
    properties.insert("route".to_string(), json!(route_id));
    properties.insert("direction".to_string(), json!(direction_id));

    let line = points.iter().map(|&(lat, lon): &LatLon| vec![lon, lat]).collect();
    collection(vec![feature(Value::LineString(line), properties)])
}
