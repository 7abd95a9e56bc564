use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::position::{DriverId, GeoPoint};

pub type OrderId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RouteStatus {
    Active,
    Completed,
    Cancelled,
}

impl RouteStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RouteStatus::Active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRoute {
    pub id: Uuid,
    pub order_id: OrderId,
    pub driver_id: DriverId,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub current_location: Option<GeoPoint>,
    pub route_points: Vec<GeoPoint>,
    pub status: RouteStatus,
    pub estimated_distance_km: f64,
    pub estimated_duration_min: f64,
    pub actual_distance_km: f64,
    pub actual_duration_min: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Route plan returned by a route provider, or the straight-line fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutePlan {
    pub distance_km: f64,
    pub duration_min: f64,
    pub points: Vec<GeoPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrivalEstimate {
    pub duration_min: f64,
    pub distance_km: f64,
    pub arrival_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::RouteStatus;

    #[test]
    fn only_active_is_non_terminal() {
        assert!(!RouteStatus::Active.is_terminal());
        assert!(RouteStatus::Completed.is_terminal());
        assert!(RouteStatus::Cancelled.is_terminal());
    }
}
