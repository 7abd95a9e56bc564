use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::AppError;
use crate::models::analytics::{DriverStats, SystemStats};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/analytics/drivers/:id", get(driver_stats))
        .route("/analytics/system", get(system_stats))
}

#[derive(Deserialize)]
pub struct WindowQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

async fn driver_stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(window): Query<WindowQuery>,
) -> Result<Json<DriverStats>, AppError> {
    let stats = state
        .analytics
        .driver_stats(&id, window.start, window.end)
        .await?;
    Ok(Json(stats))
}

async fn system_stats(State(state): State<Arc<AppState>>) -> Result<Json<SystemStats>, AppError> {
    Ok(Json(state.analytics.system_stats().await?))
}
