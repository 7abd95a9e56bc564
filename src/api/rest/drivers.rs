use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::history::{LocationHistory, TrackingInfo};
use crate::models::position::{DriverPosition, DriverStatus, GeoPoint, NearbyDriver, PositionSample};
use crate::models::route::DeliveryRoute;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers/nearby", get(find_nearby))
        .route("/drivers/:id", delete(remove_driver))
        .route(
            "/drivers/:id/position",
            post(report_position).get(get_position),
        )
        .route("/drivers/:id/status", patch(update_status))
        .route("/drivers/:id/routes", get(driver_routes))
        .route("/drivers/:id/tracking", get(tracking_info))
        .route("/drivers/:id/tracking/start", post(start_tracking))
        .route("/drivers/:id/tracking/stop", post(stop_tracking))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DriverStatus,
}

#[derive(Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    pub radius_km: f64,
    #[serde(default)]
    pub limit: usize,
    /// Comma separated, e.g. `online,stopped`.
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct StartTrackingRequest {
    pub order_id: Option<String>,
}

fn parse_statuses(raw: Option<&str>) -> Result<Vec<DriverStatus>, AppError> {
    raw.map(|raw| {
        raw.split(',')
            .filter(|part| !part.trim().is_empty())
            .map(str::parse)
            .collect()
    })
    .unwrap_or_else(|| Ok(Vec::new()))
}

async fn report_position(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<PositionSample>,
) -> Result<Json<DriverPosition>, AppError> {
    let position = state.ingestor.report_position(&id, payload).await?;
    Ok(Json(position))
}

async fn get_position(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DriverPosition>, AppError> {
    Ok(Json(state.ingestor.get_position(&id).await?))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<DriverPosition>, AppError> {
    let position = state.ingestor.set_status(&id, payload.status).await?;
    Ok(Json(position))
}

async fn remove_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.ingestor.remove_driver(&id).await?;
    state.geofence_evaluator.forget_driver(&id);
    Ok(StatusCode::NO_CONTENT)
}

async fn find_nearby(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<Vec<NearbyDriver>>, AppError> {
    let statuses = parse_statuses(query.status.as_deref())?;
    let center = GeoPoint::new(query.lat, query.lng);

    let nearby = state
        .proximity
        .find_nearby(&center, query.radius_km, &statuses, query.limit)
        .await?;
    Ok(Json(nearby))
}

async fn driver_routes(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<DeliveryRoute>>, AppError> {
    Ok(Json(state.route_tracker.routes_for_driver(&id).await?))
}

async fn tracking_info(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TrackingInfo>, AppError> {
    Ok(Json(state.sessions.tracking_info(&id).await?))
}

async fn start_tracking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Option<Json<StartTrackingRequest>>,
) -> Result<Json<LocationHistory>, AppError> {
    let order_id = payload.and_then(|Json(request)| request.order_id);
    let session = state.sessions.start(&id, order_id).await?;
    Ok(Json(session))
}

async fn stop_tracking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<LocationHistory>, AppError> {
    Ok(Json(state.sessions.stop(&id).await?))
}

#[cfg(test)]
mod tests {
    use super::parse_statuses;
    use crate::models::position::DriverStatus;

    #[test]
    fn status_list_parses_and_skips_blanks() {
        let statuses = parse_statuses(Some("online, moving,,")).unwrap();
        assert_eq!(statuses, vec![DriverStatus::Online, DriverStatus::Moving]);
        assert!(parse_statuses(None).unwrap().is_empty());
        assert!(parse_statuses(Some("online,flying")).is_err());
    }
}
