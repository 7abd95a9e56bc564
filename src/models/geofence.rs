use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo;
use crate::models::position::{DriverId, GeoPoint};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GeofenceType {
    DeliveryZone,
    Restaurant,
    Warehouse,
    City,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum Geometry {
    Circle { center: GeoPoint, radius_meters: f64 },
    Polygon { vertices: Vec<GeoPoint> },
}

impl Geometry {
    /// Circle boundaries are inclusive.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        match self {
            Geometry::Circle {
                center,
                radius_meters,
            } => geo::haversine_km(point, center) * 1000.0 <= *radius_meters,
            Geometry::Polygon { vertices } => geo::point_in_polygon(point, vertices),
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        match self {
            Geometry::Circle {
                center,
                radius_meters,
            } => {
                center.validate()?;
                if !radius_meters.is_finite() || *radius_meters <= 0.0 {
                    return Err(AppError::Validation(format!(
                        "circle radius {radius_meters} must be > 0"
                    )));
                }
                Ok(())
            }
            Geometry::Polygon { vertices } => {
                if vertices.len() < 3 {
                    return Err(AppError::Validation(format!(
                        "polygon needs at least 3 vertices, got {}",
                        vertices.len()
                    )));
                }
                vertices.iter().try_for_each(GeoPoint::validate)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geofence {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: GeofenceType,
    pub geometry: Geometry,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GeofenceEventType {
    Enter,
    Exit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeofenceEvent {
    pub driver_id: DriverId,
    pub geofence_id: Uuid,
    #[serde(rename = "type")]
    pub kind: GeofenceEventType,
    pub location: GeoPoint,
    pub timestamp: DateTime<Utc>,
}
