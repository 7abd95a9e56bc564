use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::haversine_km;
use crate::models::position::{DriverId, DriverPosition, GeoPoint};
use crate::models::route::OrderId;

/// A tracking session: the path a driver covered between start and stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationHistory {
    pub id: Uuid,
    pub driver_id: DriverId,
    pub order_id: Option<OrderId>,
    pub points: Vec<GeoPoint>,
    /// Cumulative path length in kilometers.
    pub distance_km: f64,
    /// Session length in seconds, set when the session closes.
    pub duration_secs: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingInfo {
    pub driver_id: DriverId,
    pub position: Option<DriverPosition>,
    pub session: Option<LocationHistory>,
}

impl LocationHistory {
    pub fn open(driver_id: DriverId, order_id: Option<OrderId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            driver_id,
            order_id,
            points: Vec::new(),
            distance_km: 0.0,
            duration_secs: 0.0,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// Extends the path, adding the leg from the last recorded point.
    pub fn append(&mut self, point: GeoPoint) {
        if let Some(previous) = self.points.last() {
            self.distance_km += haversine_km(previous, &point);
        }
        self.points.push(point);
    }

    pub fn close_at(&mut self, at: DateTime<Utc>) {
        let elapsed = at.signed_duration_since(self.start_time);
        self.end_time = Some(at);
        self.duration_secs = (elapsed.num_milliseconds() as f64 / 1000.0).max(0.0);
    }
}
