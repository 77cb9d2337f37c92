//! HTTP surface serving the latest snapshot and route shapes as GeoJSON.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use geojson::FeatureCollection;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::poller::{SnapshotStore, shutdown_requested};
use crate::projector::{route_feature_collection, vehicle_feature_collection};
use crate::schedule::ScheduleIndex;

/// Shared, read-only handles given to every request.
#[derive(Clone)]
pub struct AppState {
    pub index: Arc<ScheduleIndex>,
    pub snapshots: SnapshotStore,
}

#[derive(Debug, Deserialize)]
pub struct RouteQuery {
    pub direction: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/vehicles", get(vehicles))
        .route("/api/route/{route_id}", get(route_shape))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Serves on `listener` until `shutdown` fires, then drains open requests.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "Starting HTTP server");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown_requested(&mut shutdown).await })
        .await?;
    info!("HTTP server stopped");
    Ok(())
}

async fn vehicles(State(state): State<AppState>) -> Json<FeatureCollection> {
    let snapshot = state.snapshots.latest().await;
    debug!(
        cycle = snapshot.cycle,
        vehicles = snapshot.records.len(),
        "Serving vehicle snapshot"
    );
    Json(vehicle_feature_collection(&snapshot.records))
}

async fn route_shape(
    State(state): State<AppState>,
    Path(route_id): Path<String>,
    Query(query): Query<RouteQuery>,
) -> Json<FeatureCollection> {
    let fc = route_feature_collection(&state.index, &route_id, query.direction.as_deref());
    if fc.features.is_empty() {
        debug!(route_id = %route_id, "No shape for route");
    }
    Json(fc)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
