use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::history::LocationHistory;
use crate::models::position::GeoPoint;
use crate::models::route::{ArrivalEstimate, DeliveryRoute};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/routes", post(create_route))
        .route("/routes/active", get(active_routes))
        .route("/routes/:order_id", get(get_route))
        .route("/routes/:order_id/progress", patch(update_progress))
        .route("/routes/:order_id/complete", post(complete_route))
        .route("/routes/:order_id/cancel", post(cancel_route))
        .route("/routes/:order_id/eta", get(estimate_arrival))
        .route("/routes/:order_id/sessions", get(order_sessions))
}

#[derive(Deserialize)]
pub struct CreateRouteRequest {
    pub order_id: String,
    pub driver_id: String,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
}

#[derive(Deserialize)]
pub struct UpdateProgressRequest {
    pub location: GeoPoint,
}

async fn create_route(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateRouteRequest>,
) -> Result<Json<DeliveryRoute>, AppError> {
    let route = state
        .route_tracker
        .create_route(
            &payload.order_id,
            &payload.driver_id,
            payload.pickup,
            payload.dropoff,
        )
        .await?;
    Ok(Json(route))
}

async fn active_routes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DeliveryRoute>>, AppError> {
    Ok(Json(state.route_tracker.get_active_routes().await?))
}

async fn get_route(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<DeliveryRoute>, AppError> {
    Ok(Json(state.route_tracker.get_route(&order_id).await?))
}

async fn update_progress(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
    Json(payload): Json<UpdateProgressRequest>,
) -> Result<Json<DeliveryRoute>, AppError> {
    let route = state
        .route_tracker
        .update_progress(&order_id, payload.location)
        .await?;
    Ok(Json(route))
}

async fn complete_route(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<DeliveryRoute>, AppError> {
    Ok(Json(state.route_tracker.complete_route(&order_id).await?))
}

async fn cancel_route(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<DeliveryRoute>, AppError> {
    Ok(Json(state.route_tracker.cancel_route(&order_id).await?))
}

async fn estimate_arrival(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<ArrivalEstimate>, AppError> {
    Ok(Json(state.route_tracker.estimate_arrival(&order_id).await?))
}

async fn order_sessions(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<Vec<LocationHistory>>, AppError> {
    Ok(Json(state.sessions.sessions_for_order(&order_id).await?))
}
