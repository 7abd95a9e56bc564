use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::history::{LocationHistory, TrackingInfo};
use crate::models::position::GeoPoint;
use crate::repository::{HistoryRepository, PositionRepository};

/// Owns tracking sessions. A driver has at most one open session.
pub struct SessionTracker {
    history: Arc<dyn HistoryRepository>,
    positions: Arc<dyn PositionRepository>,
}

impl SessionTracker {
    pub fn new(history: Arc<dyn HistoryRepository>, positions: Arc<dyn PositionRepository>) -> Self {
        Self { history, positions }
    }

    /// Opens a new session, closing whatever session the driver still had open.
    pub async fn start(
        &self,
        driver_id: &str,
        order_id: Option<String>,
    ) -> Result<LocationHistory, AppError> {
        if driver_id.trim().is_empty() {
            return Err(AppError::Validation("driver id cannot be empty".to_string()));
        }

        for stale in self.open_sessions(driver_id).await? {
            warn!(driver_id, session_id = %stale.id, "closing previous open session");
            match self.close(stale.id).await {
                Ok(_) | Err(AppError::Conflict(_)) => {}
                Err(err) => return Err(err),
            }
        }

        let session = self
            .history
            .create(LocationHistory::open(driver_id.to_string(), order_id))
            .await?;

        info!(
            driver_id,
            session_id = %session.id,
            order_id = ?session.order_id,
            "tracking started"
        );
        Ok(session)
    }

    pub async fn stop(&self, driver_id: &str) -> Result<LocationHistory, AppError> {
        let session = self
            .open_session(driver_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("no open tracking session for driver {driver_id}"))
            })?;

        self.close(session.id).await
    }

    /// Closes the driver's open session only if it belongs to `order_id`.
    pub async fn stop_for_order(
        &self,
        driver_id: &str,
        order_id: &str,
    ) -> Result<Option<LocationHistory>, AppError> {
        match self.open_session(driver_id).await? {
            Some(session) if session.order_id.as_deref() == Some(order_id) => {
                self.close(session.id).await.map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Appends to the open session path. Without an open session this is a no-op,
    /// including when the session closes between lookup and append.
    pub async fn record_point(
        &self,
        driver_id: &str,
        point: GeoPoint,
    ) -> Result<Option<LocationHistory>, AppError> {
        let Some(session) = self.open_session(driver_id).await? else {
            return Ok(None);
        };

        match self.history.append_point(session.id, point).await {
            Ok(session) => Ok(Some(session)),
            Err(AppError::Conflict(_)) => {
                debug!(driver_id, session_id = %session.id, "session closed; point not recorded");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn tracking_info(&self, driver_id: &str) -> Result<TrackingInfo, AppError> {
        let position = self.positions.get_by_driver(driver_id).await?;
        let session = self.open_session(driver_id).await?;

        if position.is_none() && session.is_none() {
            return Err(AppError::NotFound(format!(
                "no tracking data for driver {driver_id}"
            )));
        }

        Ok(TrackingInfo {
            driver_id: driver_id.to_string(),
            position,
            session,
        })
    }

    pub async fn session(&self, id: Uuid) -> Result<LocationHistory, AppError> {
        self.history
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("tracking session {id} not found")))
    }

    pub async fn sessions_for_order(&self, order_id: &str) -> Result<Vec<LocationHistory>, AppError> {
        self.history.get_by_order(order_id).await
    }

    pub async fn open_session(&self, driver_id: &str) -> Result<Option<LocationHistory>, AppError> {
        Ok(self.open_sessions(driver_id).await?.pop())
    }

    async fn open_sessions(&self, driver_id: &str) -> Result<Vec<LocationHistory>, AppError> {
        let sessions = self.history.get_by_driver(driver_id, None, None).await?;
        Ok(sessions
            .into_iter()
            .filter(LocationHistory::is_open)
            .collect())
    }

    async fn close(&self, id: Uuid) -> Result<LocationHistory, AppError> {
        let session = self.history.close(id, Utc::now()).await?;
        info!(
            driver_id = %session.driver_id,
            session_id = %session.id,
            distance_km = session.distance_km,
            duration_secs = session.duration_secs,
            "tracking stopped"
        );
        Ok(session)
    }
}
