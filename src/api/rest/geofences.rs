use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::geofence::{Geofence, GeofenceEvent, GeofenceType, Geometry};
use crate::models::position::{DriverPosition, GeoPoint};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/geofences", post(create_geofence).get(list_geofences))
        .route(
            "/geofences/:id",
            get(get_geofence).put(update_geofence).delete(delete_geofence),
        )
        .route("/geofences/:id/drivers", get(drivers_inside))
        .route("/geofences/evaluate", post(evaluate))
}

fn default_active() -> bool {
    true
}

#[derive(Deserialize)]
pub struct GeofenceRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: GeofenceType,
    pub geometry: Geometry,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl GeofenceRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("name cannot be empty".to_string()));
        }
        self.geometry.validate()
    }
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(rename = "type")]
    pub kind: Option<GeofenceType>,
}

#[derive(Deserialize)]
pub struct EvaluateRequest {
    pub driver_id: String,
    pub location: GeoPoint,
}

async fn create_geofence(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GeofenceRequest>,
) -> Result<Json<Geofence>, AppError> {
    payload.validate()?;

    let now = Utc::now();
    let geofence = state
        .geofences
        .create(Geofence {
            id: Uuid::new_v4(),
            name: payload.name,
            kind: payload.kind,
            geometry: payload.geometry,
            metadata: payload.metadata,
            is_active: payload.is_active,
            created_at: now,
            updated_at: now,
        })
        .await?;

    info!(geofence_id = %geofence.id, name = %geofence.name, "geofence created");
    Ok(Json(geofence))
}

async fn list_geofences(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Geofence>>, AppError> {
    let geofences = match query.kind {
        Some(kind) => state.geofences.get_by_type(kind).await?,
        None => state.geofences.get_all().await?,
    };
    Ok(Json(geofences))
}

async fn find(state: &AppState, id: Uuid) -> Result<Geofence, AppError> {
    state
        .geofences
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("geofence {id} not found")))
}

async fn get_geofence(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Geofence>, AppError> {
    Ok(Json(find(&state, id).await?))
}

async fn update_geofence(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<GeofenceRequest>,
) -> Result<Json<Geofence>, AppError> {
    payload.validate()?;
    let existing = find(&state, id).await?;

    let geofence = state
        .geofences
        .update(Geofence {
            id,
            name: payload.name,
            kind: payload.kind,
            geometry: payload.geometry,
            metadata: payload.metadata,
            is_active: payload.is_active,
            created_at: existing.created_at,
            updated_at: Utc::now(),
        })
        .await?;
    Ok(Json(geofence))
}

async fn delete_geofence(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.geofences.delete(id).await?;
    state.geofence_evaluator.forget_geofence(id);
    info!(geofence_id = %id, "geofence deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn drivers_inside(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DriverPosition>>, AppError> {
    let geofence = find(&state, id).await?;
    Ok(Json(state.positions.get_within_geofence(&geofence).await?))
}

/// Synchronous evaluation, for checking a point without reporting a position.
async fn evaluate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EvaluateRequest>,
) -> Result<Json<Vec<GeofenceEvent>>, AppError> {
    payload.location.validate()?;
    let events = state
        .geofence_evaluator
        .evaluate(&payload.driver_id, &payload.location)
        .await?;
    Ok(Json(events))
}
