//! `DashMap`-backed repositories. Every operation touches one shard entry,
//! which gives the per-entity atomicity the engine relies on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::geofence::{Geofence, GeofenceType};
use crate::models::history::LocationHistory;
use crate::models::position::{DriverId, DriverPosition, DriverStatus, GeoPoint};
use crate::models::route::{DeliveryRoute, OrderId, RouteStatus};
use crate::repository::{
    GeofenceRepository, HistoryRepository, PositionRepository, RouteRepository,
};

#[derive(Default)]
pub struct InMemoryPositionRepository {
    positions: DashMap<DriverId, DriverPosition>,
}

impl InMemoryPositionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[async_trait]
impl PositionRepository for InMemoryPositionRepository {
    async fn upsert(&self, position: DriverPosition) -> Result<DriverPosition, AppError> {
        self.positions
            .insert(position.driver_id.clone(), position.clone());
        Ok(position)
    }

    async fn get_by_driver(&self, driver_id: &str) -> Result<Option<DriverPosition>, AppError> {
        Ok(self
            .positions
            .get(driver_id)
            .map(|entry| entry.value().clone()))
    }

    async fn find_nearby(
        &self,
        center: &GeoPoint,
        radius_meters: f64,
        statuses: &[DriverStatus],
        limit: usize,
    ) -> Result<Vec<DriverPosition>, AppError> {
        let radius_km = radius_meters / 1000.0;

        let mut matches: Vec<(f64, DriverPosition)> = self
            .positions
            .iter()
            .filter(|entry| statuses.contains(&entry.value().status))
            .filter_map(|entry| {
                let distance = haversine_km(center, &entry.value().location);
                (distance <= radius_km).then(|| (distance, entry.value().clone()))
            })
            .collect();

        matches.sort_by(|a, b| a.0.total_cmp(&b.0));
        matches.truncate(limit);

        Ok(matches.into_iter().map(|(_, position)| position).collect())
    }

    async fn get_within_geofence(
        &self,
        geofence: &Geofence,
    ) -> Result<Vec<DriverPosition>, AppError> {
        Ok(self
            .positions
            .iter()
            .filter(|entry| geofence.geometry.contains(&entry.value().location))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn set_status(
        &self,
        driver_id: &str,
        status: DriverStatus,
    ) -> Result<DriverPosition, AppError> {
        let mut position = self
            .positions
            .get_mut(driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

        position.status = status;
        position.updated_at = Utc::now();

        Ok(position.clone())
    }

    async fn delete(&self, driver_id: &str) -> Result<(), AppError> {
        self.positions
            .remove(driver_id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))
    }
}

#[derive(Default)]
pub struct InMemoryHistoryRepository {
    sessions: DashMap<Uuid, LocationHistory>,
}

impl InMemoryHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_by_start(mut sessions: Vec<LocationHistory>) -> Vec<LocationHistory> {
    sessions.sort_by_key(|session| session.start_time);
    sessions
}

#[async_trait]
impl HistoryRepository for InMemoryHistoryRepository {
    async fn create(&self, session: LocationHistory) -> Result<LocationHistory, AppError> {
        match self.sessions.entry(session.id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "tracking session {} already exists",
                session.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
                Ok(session)
            }
        }
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<LocationHistory>, AppError> {
        Ok(self.sessions.get(&id).map(|entry| entry.value().clone()))
    }

    async fn get_by_driver(
        &self,
        driver_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<LocationHistory>, AppError> {
        let sessions = self
            .sessions
            .iter()
            .filter(|entry| {
                let session = entry.value();
                session.driver_id == driver_id
                    && start.is_none_or(|start| session.start_time >= start)
                    && end.is_none_or(|end| session.start_time <= end)
            })
            .map(|entry| entry.value().clone())
            .collect();

        Ok(sorted_by_start(sessions))
    }

    async fn get_by_order(&self, order_id: &str) -> Result<Vec<LocationHistory>, AppError> {
        let sessions = self
            .sessions
            .iter()
            .filter(|entry| entry.value().order_id.as_deref() == Some(order_id))
            .map(|entry| entry.value().clone())
            .collect();

        Ok(sorted_by_start(sessions))
    }

    async fn update(&self, session: LocationHistory) -> Result<LocationHistory, AppError> {
        let mut stored = self.sessions.get_mut(&session.id).ok_or_else(|| {
            AppError::NotFound(format!("tracking session {} not found", session.id))
        })?;

        if !stored.is_open() && session.is_open() {
            return Err(AppError::Conflict(format!(
                "tracking session {} is closed",
                session.id
            )));
        }

        *stored = session.clone();
        Ok(session)
    }

    async fn append_point(&self, id: Uuid, point: GeoPoint) -> Result<LocationHistory, AppError> {
        let mut stored = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("tracking session {id} not found")))?;

        if !stored.is_open() {
            return Err(AppError::Conflict(format!("tracking session {id} is closed")));
        }

        stored.append(point);
        Ok(stored.clone())
    }

    async fn close(&self, id: Uuid, at: DateTime<Utc>) -> Result<LocationHistory, AppError> {
        let mut stored = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("tracking session {id} not found")))?;

        if !stored.is_open() {
            return Err(AppError::Conflict(format!(
                "tracking session {id} is already closed"
            )));
        }

        stored.close_at(at);
        Ok(stored.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        self.sessions
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("tracking session {id} not found")))
    }
}

#[derive(Default)]
pub struct InMemoryRouteRepository {
    routes: DashMap<OrderId, DeliveryRoute>,
}

impl InMemoryRouteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn close(&self, order_id: &str, status: RouteStatus) -> Result<(), AppError> {
        let mut route = self
            .routes
            .get_mut(order_id)
            .ok_or_else(|| AppError::NotFound(format!("route for order {order_id} not found")))?;

        if route.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "route for order {order_id} is already {:?}",
                route.status
            )));
        }

        let now = Utc::now();
        route.status = status;
        route.updated_at = now;
        if status == RouteStatus::Completed {
            let elapsed = now.signed_duration_since(route.started_at);
            route.completed_at = Some(now);
            route.actual_duration_min = Some(elapsed.num_milliseconds() as f64 / 60_000.0);
        }

        Ok(())
    }
}

#[async_trait]
impl RouteRepository for InMemoryRouteRepository {
    async fn create(&self, route: DeliveryRoute) -> Result<DeliveryRoute, AppError> {
        match self.routes.entry(route.order_id.clone()) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "route for order {} already exists",
                route.order_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(route.clone());
                Ok(route)
            }
        }
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<DeliveryRoute>, AppError> {
        Ok(self
            .routes
            .iter()
            .find(|entry| entry.value().id == id)
            .map(|entry| entry.value().clone()))
    }

    async fn get_by_order(&self, order_id: &str) -> Result<Option<DeliveryRoute>, AppError> {
        Ok(self.routes.get(order_id).map(|entry| entry.value().clone()))
    }

    async fn get_by_driver(&self, driver_id: &str) -> Result<Vec<DeliveryRoute>, AppError> {
        let mut routes: Vec<DeliveryRoute> = self
            .routes
            .iter()
            .filter(|entry| entry.value().driver_id == driver_id)
            .map(|entry| entry.value().clone())
            .collect();
        routes.sort_by_key(|route| route.started_at);
        Ok(routes)
    }

    async fn get_all_active(&self) -> Result<Vec<DeliveryRoute>, AppError> {
        let mut routes: Vec<DeliveryRoute> = self
            .routes
            .iter()
            .filter(|entry| entry.value().status == RouteStatus::Active)
            .map(|entry| entry.value().clone())
            .collect();
        routes.sort_by_key(|route| route.started_at);
        Ok(routes)
    }

    async fn update(&self, route: DeliveryRoute) -> Result<DeliveryRoute, AppError> {
        let mut stored = self.routes.get_mut(&route.order_id).ok_or_else(|| {
            AppError::NotFound(format!("route for order {} not found", route.order_id))
        })?;

        if stored.status.is_terminal() && stored.status != route.status {
            return Err(AppError::Conflict(format!(
                "route for order {} is already {:?}",
                route.order_id, stored.status
            )));
        }

        *stored = route.clone();
        Ok(route)
    }

    async fn mark_complete(&self, order_id: &str) -> Result<(), AppError> {
        self.close(order_id, RouteStatus::Completed)
    }

    async fn mark_cancelled(&self, order_id: &str) -> Result<(), AppError> {
        self.close(order_id, RouteStatus::Cancelled)
    }

    async fn delete(&self, order_id: &str) -> Result<(), AppError> {
        self.routes
            .remove(order_id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("route for order {order_id} not found")))
    }
}

#[derive(Default)]
pub struct InMemoryGeofenceRepository {
    geofences: DashMap<Uuid, Geofence>,
}

impl InMemoryGeofenceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GeofenceRepository for InMemoryGeofenceRepository {
    async fn create(&self, geofence: Geofence) -> Result<Geofence, AppError> {
        match self.geofences.entry(geofence.id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "geofence {} already exists",
                geofence.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(geofence.clone());
                Ok(geofence)
            }
        }
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Geofence>, AppError> {
        Ok(self.geofences.get(&id).map(|entry| entry.value().clone()))
    }

    async fn get_all(&self) -> Result<Vec<Geofence>, AppError> {
        let mut geofences: Vec<Geofence> = self
            .geofences
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        geofences.sort_by_key(|geofence| geofence.created_at);
        Ok(geofences)
    }

    async fn get_by_type(&self, kind: GeofenceType) -> Result<Vec<Geofence>, AppError> {
        let mut geofences: Vec<Geofence> = self
            .geofences
            .iter()
            .filter(|entry| entry.value().kind == kind)
            .map(|entry| entry.value().clone())
            .collect();
        geofences.sort_by_key(|geofence| geofence.created_at);
        Ok(geofences)
    }

    async fn update(&self, geofence: Geofence) -> Result<Geofence, AppError> {
        let mut stored = self
            .geofences
            .get_mut(&geofence.id)
            .ok_or_else(|| AppError::NotFound(format!("geofence {} not found", geofence.id)))?;

        *stored = geofence.clone();
        Ok(geofence)
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        self.geofences
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("geofence {id} not found")))
    }
}
