//! Storage contracts the engine reads and writes through.
//!
//! Each call is expected to be atomic for the single entity it touches
//! (upsert by key, status change by key). The engine adds no locking above that.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::geofence::{Geofence, GeofenceType};
use crate::models::history::LocationHistory;
use crate::models::position::{DriverPosition, DriverStatus, GeoPoint};
use crate::models::route::DeliveryRoute;

pub use memory::{
    InMemoryGeofenceRepository, InMemoryHistoryRepository, InMemoryPositionRepository,
    InMemoryRouteRepository,
};

#[async_trait]
pub trait PositionRepository: Send + Sync {
    /// Insert or replace the single record for `position.driver_id`.
    async fn upsert(&self, position: DriverPosition) -> Result<DriverPosition, AppError>;

    async fn get_by_driver(&self, driver_id: &str) -> Result<Option<DriverPosition>, AppError>;

    /// Drivers within `radius_meters` of `center` whose status is in `statuses`,
    /// nearest first, at most `limit` of them.
    async fn find_nearby(
        &self,
        center: &GeoPoint,
        radius_meters: f64,
        statuses: &[DriverStatus],
        limit: usize,
    ) -> Result<Vec<DriverPosition>, AppError>;

    async fn get_within_geofence(&self, geofence: &Geofence)
    -> Result<Vec<DriverPosition>, AppError>;

    async fn set_status(
        &self,
        driver_id: &str,
        status: DriverStatus,
    ) -> Result<DriverPosition, AppError>;

    async fn delete(&self, driver_id: &str) -> Result<(), AppError>;
}

#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn create(&self, session: LocationHistory) -> Result<LocationHistory, AppError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<LocationHistory>, AppError>;

    /// Sessions whose `start_time` falls inside the optional window, oldest first.
    async fn get_by_driver(
        &self,
        driver_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<LocationHistory>, AppError>;

    async fn get_by_order(&self, order_id: &str) -> Result<Vec<LocationHistory>, AppError>;

    /// Fails with `Conflict` when the write would reopen a closed session.
    async fn update(&self, session: LocationHistory) -> Result<LocationHistory, AppError>;

    /// Appends to an open session in place. `Conflict` once the session is closed.
    async fn append_point(&self, id: Uuid, point: GeoPoint) -> Result<LocationHistory, AppError>;

    /// Stamps `end_time` and the duration. `Conflict` when already closed.
    async fn close(&self, id: Uuid, at: DateTime<Utc>) -> Result<LocationHistory, AppError>;

    async fn delete(&self, id: Uuid) -> Result<(), AppError>;
}

#[async_trait]
pub trait RouteRepository: Send + Sync {
    /// Fails with `Conflict` when a route already exists for the order.
    async fn create(&self, route: DeliveryRoute) -> Result<DeliveryRoute, AppError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<DeliveryRoute>, AppError>;

    async fn get_by_order(&self, order_id: &str) -> Result<Option<DeliveryRoute>, AppError>;

    async fn get_by_driver(&self, driver_id: &str) -> Result<Vec<DeliveryRoute>, AppError>;

    async fn get_all_active(&self) -> Result<Vec<DeliveryRoute>, AppError>;

    /// Must refuse (with `Conflict`) to move a terminal route to another status.
    async fn update(&self, route: DeliveryRoute) -> Result<DeliveryRoute, AppError>;

    /// `active -> completed`. Terminal routes yield `Conflict`.
    async fn mark_complete(&self, order_id: &str) -> Result<(), AppError>;

    /// `active -> cancelled`. Terminal routes yield `Conflict`.
    async fn mark_cancelled(&self, order_id: &str) -> Result<(), AppError>;

    async fn delete(&self, order_id: &str) -> Result<(), AppError>;
}

#[async_trait]
pub trait GeofenceRepository: Send + Sync {
    async fn create(&self, geofence: Geofence) -> Result<Geofence, AppError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Geofence>, AppError>;

    async fn get_all(&self) -> Result<Vec<Geofence>, AppError>;

    async fn get_by_type(&self, kind: GeofenceType) -> Result<Vec<Geofence>, AppError>;

    async fn update(&self, geofence: Geofence) -> Result<Geofence, AppError>;

    async fn delete(&self, id: Uuid) -> Result<(), AppError>;
}
