use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use crate::engine::geofence::GeofenceEvaluator;
use crate::engine::queue::{DispatchOutcome, DriverJobHandler, DriverQueue};
use crate::engine::route::RouteTracker;
use crate::engine::tracking::SessionTracker;
use crate::error::AppError;
use crate::models::position::{DriverPosition, DriverStatus, GeoPoint, PositionSample};
use crate::observability::metrics::Metrics;
use crate::repository::PositionRepository;

/// Entry point for raw driver samples.
pub struct PositionIngestor {
    positions: Arc<dyn PositionRepository>,
    queue: Arc<DriverQueue>,
    metrics: Metrics,
}

impl PositionIngestor {
    pub fn new(
        positions: Arc<dyn PositionRepository>,
        queue: Arc<DriverQueue>,
        metrics: Metrics,
    ) -> Self {
        Self {
            positions,
            queue,
            metrics,
        }
    }

    /// Stores the sample as the driver's current position, then queues the
    /// geofence check and route update for that driver. The caller never
    /// waits on, or hears about, the queued work.
    pub async fn report_position(
        &self,
        driver_id: &str,
        sample: PositionSample,
    ) -> Result<DriverPosition, AppError> {
        if driver_id.trim().is_empty() {
            return Err(AppError::Validation("driver id cannot be empty".to_string()));
        }
        sample.validate()?;

        let location = GeoPoint::new(sample.lat, sample.lng);
        let status = DriverStatus::from_speed(sample.speed);

        let created_at = self
            .positions
            .get_by_driver(driver_id)
            .await?
            .map(|existing| existing.created_at)
            .unwrap_or(location.timestamp);

        let position = self
            .positions
            .upsert(DriverPosition {
                driver_id: driver_id.to_string(),
                location: location.clone(),
                heading: sample.heading,
                speed: sample.speed,
                accuracy: sample.accuracy,
                altitude: sample.altitude,
                status,
                updated_at: location.timestamp,
                created_at,
            })
            .await?;
        self.metrics.positions_reported_total.inc();

        if self.queue.dispatch(driver_id, location) == DispatchOutcome::Dropped {
            debug!(driver_id, "side effects skipped for this sample");
        }

        Ok(position)
    }

    pub async fn get_position(&self, driver_id: &str) -> Result<DriverPosition, AppError> {
        self.positions
            .get_by_driver(driver_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))
    }

    /// Explicit status change; the only way a driver becomes online/offline.
    pub async fn set_status(
        &self,
        driver_id: &str,
        status: DriverStatus,
    ) -> Result<DriverPosition, AppError> {
        self.positions.set_status(driver_id, status).await
    }

    pub async fn remove_driver(&self, driver_id: &str) -> Result<(), AppError> {
        self.positions.delete(driver_id).await
    }
}

/// The work queued for each accepted sample. Each step is attempted even
/// if an earlier one failed.
pub struct PositionEffects {
    geofences: Arc<GeofenceEvaluator>,
    routes: Arc<RouteTracker>,
    sessions: Arc<SessionTracker>,
}

impl PositionEffects {
    pub fn new(
        geofences: Arc<GeofenceEvaluator>,
        routes: Arc<RouteTracker>,
        sessions: Arc<SessionTracker>,
    ) -> Self {
        Self {
            geofences,
            routes,
            sessions,
        }
    }
}

#[async_trait]
impl DriverJobHandler for PositionEffects {
    async fn handle(&self, driver_id: &str, point: GeoPoint) -> Result<(), AppError> {
        let geofence = self.geofences.evaluate(driver_id, &point).await.map(|_| ());
        if let Err(err) = &geofence {
            warn!(driver_id, error = %err, "geofence evaluation failed");
        }

        let progress = self.routes.advance_driver(driver_id, &point).await.map(|_| ());
        if let Err(err) = &progress {
            warn!(driver_id, error = %err, "route progress update failed");
        }

        let session = self.sessions.record_point(driver_id, point).await.map(|_| ());
        if let Err(err) = &session {
            warn!(driver_id, error = %err, "tracking session update failed");
        }

        geofence.and(progress).and(session)
    }
}
