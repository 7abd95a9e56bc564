use async_trait::async_trait;
use tracing::debug;

use crate::error::AppError;
use crate::models::position::GeoPoint;
use crate::models::route::{ArrivalEstimate, RoutePlan};

/// External maps/ETA service. Any `Err` is recoverable: callers fall back
/// to straight-line estimates.
#[async_trait]
pub trait RouteProvider: Send + Sync {
    async fn plan_route(&self, origin: &GeoPoint, dest: &GeoPoint) -> Result<RoutePlan, AppError>;

    async fn estimate_arrival(
        &self,
        origin: &GeoPoint,
        dest: &GeoPoint,
    ) -> Result<ArrivalEstimate, AppError>;

    async fn reverse_geocode(&self, point: &GeoPoint) -> Result<String, AppError>;
}

/// Used when no maps service is configured. Every call fails so route
/// creation and ETA take the straight-line path.
#[derive(Debug, Default, Clone)]
pub struct OfflineRouteProvider;

impl OfflineRouteProvider {
    fn unavailable(operation: &str) -> AppError {
        debug!(operation, "route provider offline");
        AppError::Provider(format!("{operation}: no route provider configured"))
    }
}

#[async_trait]
impl RouteProvider for OfflineRouteProvider {
    async fn plan_route(&self, _origin: &GeoPoint, _dest: &GeoPoint) -> Result<RoutePlan, AppError> {
        Err(Self::unavailable("plan_route"))
    }

    async fn estimate_arrival(
        &self,
        _origin: &GeoPoint,
        _dest: &GeoPoint,
    ) -> Result<ArrivalEstimate, AppError> {
        Err(Self::unavailable("estimate_arrival"))
    }

    async fn reverse_geocode(&self, _point: &GeoPoint) -> Result<String, AppError> {
        Err(Self::unavailable("reverse_geocode"))
    }
}
