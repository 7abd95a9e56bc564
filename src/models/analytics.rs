use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::position::DriverId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverStats {
    pub driver_id: DriverId,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub sessions: usize,
    pub total_distance_km: f64,
    pub total_duration_secs: f64,
    pub total_deliveries: usize,
    pub average_speed_kmh: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStats {
    pub active_deliveries: usize,
    /// Mean `actual_duration_min` over active routes that carry one.
    pub average_delivery_time_min: f64,
    pub generated_at: DateTime<Utc>,
}
