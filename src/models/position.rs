use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub type DriverId = String;

/// Reported speeds above this are classified as `Moving`.
pub const MOVING_SPEED_THRESHOLD_KMH: f64 = 1.0;

/// WGS-84 position in degrees, stamped with the instant it was observed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            timestamp: Utc::now(),
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(AppError::Validation(format!(
                "latitude {} out of range [-90, 90]",
                self.lat
            )));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(AppError::Validation(format!(
                "longitude {} out of range [-180, 180]",
                self.lng
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DriverStatus {
    Online,
    Offline,
    Moving,
    Stopped,
}

impl DriverStatus {
    pub fn from_speed(speed_kmh: f64) -> Self {
        if speed_kmh > MOVING_SPEED_THRESHOLD_KMH {
            DriverStatus::Moving
        } else {
            DriverStatus::Stopped
        }
    }

    /// Drivers in motion are left out of nearby searches by default.
    pub fn default_search_filter() -> Vec<DriverStatus> {
        vec![DriverStatus::Online, DriverStatus::Stopped]
    }
}

impl std::str::FromStr for DriverStatus {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(DriverStatus::Online),
            "offline" => Ok(DriverStatus::Offline),
            "moving" => Ok(DriverStatus::Moving),
            "stopped" => Ok(DriverStatus::Stopped),
            other => Err(AppError::Validation(format!(
                "unknown driver status: {other}, expected online/offline/moving/stopped"
            ))),
        }
    }
}

/// Raw sample as reported by a driver device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSample {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub heading: f64,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub accuracy: f64,
    #[serde(default)]
    pub altitude: f64,
}

impl PositionSample {
    pub fn validate(&self) -> Result<(), AppError> {
        GeoPoint::new(self.lat, self.lng).validate()?;

        if !self.speed.is_finite() || self.speed < 0.0 {
            return Err(AppError::Validation(format!(
                "speed {} must be a non-negative number",
                self.speed
            )));
        }
        if !self.heading.is_finite() || !(0.0..=360.0).contains(&self.heading) {
            return Err(AppError::Validation(format!(
                "heading {} out of range [0, 360]",
                self.heading
            )));
        }
        if !self.accuracy.is_finite() || self.accuracy < 0.0 {
            return Err(AppError::Validation(format!(
                "accuracy {} must be a non-negative number",
                self.accuracy
            )));
        }
        if !self.altitude.is_finite() {
            return Err(AppError::Validation("altitude must be finite".to_string()));
        }
        Ok(())
    }
}

/// Current position of a driver. One record per driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverPosition {
    pub driver_id: DriverId,
    pub location: GeoPoint,
    pub heading: f64,
    pub speed: f64,
    pub accuracy: f64,
    pub altitude: f64,
    pub status: DriverStatus,
    pub updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearbyDriver {
    pub driver_id: DriverId,
    pub location: GeoPoint,
    pub distance_km: f64,
    pub status: DriverStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_threshold_is_exclusive() {
        assert_eq!(DriverStatus::from_speed(0.0), DriverStatus::Stopped);
        assert_eq!(DriverStatus::from_speed(1.0), DriverStatus::Stopped);
        assert_eq!(DriverStatus::from_speed(1.01), DriverStatus::Moving);
        assert_eq!(DriverStatus::from_speed(20.0), DriverStatus::Moving);
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        assert!(GeoPoint::new(91.0, 0.0).validate().is_err());
        assert!(GeoPoint::new(0.0, -180.5).validate().is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).validate().is_err());
        assert!(GeoPoint::new(-90.0, 180.0).validate().is_ok());
    }

    #[test]
    fn negative_speed_is_rejected() {
        let sample = PositionSample {
            lat: 40.0,
            lng: -3.0,
            heading: 0.0,
            speed: -2.0,
            accuracy: 5.0,
            altitude: 600.0,
        };
        assert!(matches!(sample.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Online".parse::<DriverStatus>().unwrap(), DriverStatus::Online);
        assert_eq!(" stopped ".parse::<DriverStatus>().unwrap(), DriverStatus::Stopped);
        assert!("parked".parse::<DriverStatus>().is_err());
    }
}
