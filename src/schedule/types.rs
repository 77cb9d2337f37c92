use std::collections::{BTreeMap, HashMap};

/// A `(latitude, longitude)` pair, in that order.
pub type LatLon = (f64, f64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapePoint {
    pub sequence: u32,
    pub lat: f64,
    pub lon: f64,
}

/// The polyline drawn for each direction of one route.
///
/// Directions are kept in lexicographic order so "first direction" is the
/// same on every platform. A direction present here always has points.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteShape {
    directions: BTreeMap<String, Vec<LatLon>>,
}

impl RouteShape {
    /// Records `points` for `direction_id`. Empty point lists are ignored.
    pub fn insert(&mut self, direction_id: impl Into<String>, points: Vec<LatLon>) {
        if !points.is_empty() {
            self.directions.insert(direction_id.into(), points);
        }
    }

    pub fn direction(&self, direction_id: &str) -> Option<&[LatLon]> {
        self.directions.get(direction_id).map(Vec::as_slice)
    }

    /// Lexicographically smallest direction id and its points.
    pub fn first_direction(&self) -> Option<(&str, &[LatLon])> {
        self.directions
            .iter()
            .next()
            .map(|(d, pts)| (d.as_str(), pts.as_slice()))
    }

    pub fn directions(&self) -> impl Iterator<Item = (&str, &[LatLon])> {
        self.directions
            .iter()
            .map(|(d, pts)| (d.as_str(), pts.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.directions.is_empty()
    }
}

/// Route id to [`RouteShape`], immutable once built.
#[derive(Debug, Clone, Default)]
pub struct ScheduleIndex {
    routes: HashMap<String, RouteShape>,
}

impl ScheduleIndex {
    pub fn new(routes: HashMap<String, RouteShape>) -> Self {
        let routes = routes
            .into_iter()
            .filter(|(_, shape)| !shape.is_empty())
            .collect();
        Self { routes }
    }

    pub fn route(&self, route_id: &str) -> Option<&RouteShape> {
        self.routes.get(route_id)
    }

    /// Picks the polyline to draw for `route_id`.
    ///
    /// Uses `direction_id` when the route has it, otherwise falls back to the
    /// route's first direction. `None` only when the route has no shape.
    pub fn resolve(&self, route_id: &str, direction_id: Option<&str>) -> Option<(&str, &[LatLon])> {
        let shape = self.route(route_id)?;
        if let Some(d) = direction_id {
            if let Some((key, pts)) = shape.directions.get_key_value(d) {
                return Some((key.as_str(), pts.as_slice()));
            }
        }
        shape.first_direction()
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
