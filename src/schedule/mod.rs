//! Static schedule index: which polyline each route draws, per direction.
//!
//! Built once at startup from `trips.txt` and `shapes.txt`, then shared
//! read-only behind an `Arc`.

mod loader;
mod types;

pub use types::{LatLon, RouteShape, ScheduleIndex, ShapePoint};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("static table '{}' unavailable: {source}", .path.display())]
    StaticDataMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not read static table: {0}")]
    Csv(#[from] csv::Error),
}
