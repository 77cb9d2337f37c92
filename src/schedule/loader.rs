use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use super::{IndexError, LatLon, RouteShape, ScheduleIndex, ShapePoint};

const TRIPS_FILE: &str = "trips.txt";
const SHAPES_FILE: &str = "shapes.txt";

/// Direction assumed for trips that leave `direction_id` out.
const DEFAULT_DIRECTION: &str = "0";

#[derive(Debug, Deserialize)]
struct TripRow {
    route_id: String,
    #[serde(default)]
    direction_id: Option<String>,
    #[serde(default)]
    shape_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShapeRow {
    shape_id: String,
    shape_pt_lat: f64,
    shape_pt_lon: f64,
    shape_pt_sequence: u32,
}

/// Shape candidates per (route, direction), in the order trips name them.
#[derive(Debug, Default)]
struct ShapeCandidates {
    by_key: HashMap<(String, String), Vec<String>>,
}

impl ShapeCandidates {
    fn push(&mut self, route_id: String, direction_id: String, shape_id: String) {
        let shapes = self.by_key.entry((route_id, direction_id)).or_default();
        if !shapes.contains(&shape_id) {
            shapes.push(shape_id);
        }
    }
}

impl ScheduleIndex {
    /// Builds the index from a trips table and a shapes table.
    ///
    /// For each (route, direction) the first shape id named by the trips
    /// table that resolves to points wins. Rows that fail to parse are
    /// skipped; only an unreadable table is an error.
    pub fn build<T: Read, S: Read>(trips: T, shapes: S) -> Result<Self, IndexError> {
        let candidates = read_trips(trips)?;
        let shapes = read_shapes(shapes)?;

        let mut routes: HashMap<String, RouteShape> = HashMap::new();
        for ((route_id, direction_id), shape_ids) in candidates.by_key {
            let points = shape_ids
                .iter()
                .filter_map(|id| shapes.get(id))
                .find(|pts| !pts.is_empty());

            if let Some(points) = points {
                let line: Vec<LatLon> = points.iter().map(|p| (p.lat, p.lon)).collect();
                routes.entry(route_id).or_default().insert(direction_id, line);
            }
        }

        Ok(ScheduleIndex::new(routes))
    }

    /// Loads `trips.txt` and `shapes.txt` from `dir`.
    ///
    /// Never fails: a missing or unreadable table is logged and yields an
    /// empty index, so route requests answer "no shape" instead of the
    /// process refusing to start.
    #[tracing::instrument(skip_all, fields(dir = %dir.display()))]
    pub fn load(dir: &Path) -> Self {
        match Self::try_load(dir) {
            Ok(index) => {
                info!(routes = index.route_count(), "Schedule index built");
                index
            }
            Err(e) => {
                warn!(error = %e, "Static schedule unavailable, serving without route shapes");
                Self::default()
            }
        }
    }

    fn try_load(dir: &Path) -> Result<Self, IndexError> {
        let trips = open_table(&dir.join(TRIPS_FILE))?;
        let shapes = open_table(&dir.join(SHAPES_FILE))?;
        Self::build(trips, shapes)
    }
}

fn open_table(path: &Path) -> Result<File, IndexError> {
    File::open(path).map_err(|source| IndexError::StaticDataMissing {
        path: path.to_path_buf(),
        source,
    })
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader)
}

/// Row-level problems are skippable; anything else means the table itself
/// could not be read. A non-UTF-8 field only spoils its own record.
fn is_row_error(e: &csv::Error) -> bool {
    matches!(
        e.kind(),
        csv::ErrorKind::Deserialize { .. }
            | csv::ErrorKind::UnequalLengths { .. }
            | csv::ErrorKind::Utf8 { .. }
    )
}

fn read_trips<R: Read>(reader: R) -> Result<ShapeCandidates, IndexError> {
    let mut candidates = ShapeCandidates::default();
    let mut skipped = 0usize;

    for result in csv_reader(reader).deserialize::<TripRow>() {
        let row = match result {
            Ok(row) => row,
            Err(e) if is_row_error(&e) => {
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let Some(shape_id) = row.shape_id.filter(|s| !s.is_empty()) else {
            continue;
        };
        let direction_id = row
            .direction_id
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| DEFAULT_DIRECTION.to_string());

        candidates.push(row.route_id, direction_id, shape_id);
    }

    if skipped > 0 {
        warn!(skipped, table = TRIPS_FILE, "Skipped malformed rows");
    }
    Ok(candidates)
}

fn read_shapes<R: Read>(reader: R) -> Result<HashMap<String, Vec<ShapePoint>>, IndexError> {
    let mut shapes: HashMap<String, Vec<ShapePoint>> = HashMap::new();
    let mut skipped = 0usize;

    for result in csv_reader(reader).deserialize::<ShapeRow>() {
        let row = match result {
            Ok(row) => row,
            Err(e) if is_row_error(&e) => {
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        shapes.entry(row.shape_id).or_default().push(ShapePoint {
            sequence: row.shape_pt_sequence,
            lat: row.shape_pt_lat,
            lon: row.shape_pt_lon,
        });
    }

    // Stable: equal sequence numbers keep file order
    for points in shapes.values_mut() {
        points.sort_by_key(|p| p.sequence);
    }

    if skipped > 0 {
        warn!(skipped, table = SHAPES_FILE, "Skipped malformed rows");
    }
    Ok(shapes)
}
