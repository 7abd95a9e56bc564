use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::tracking::SessionTracker;
use crate::error::AppError;
use crate::external::RouteProvider;
use crate::geo::haversine_km;
use crate::models::position::GeoPoint;
use crate::models::route::{ArrivalEstimate, DeliveryRoute, RoutePlan, RouteStatus};
use crate::observability::metrics::Metrics;
use crate::repository::RouteRepository;

/// Duration assumed for a route when the provider cannot plan it.
pub const FALLBACK_DURATION_MIN: f64 = 30.0;

pub fn straight_line_plan(pickup: &GeoPoint, dropoff: &GeoPoint) -> RoutePlan {
    RoutePlan {
        distance_km: haversine_km(pickup, dropoff),
        duration_min: FALLBACK_DURATION_MIN,
        points: vec![pickup.clone(), dropoff.clone()],
    }
}

fn is_usable(plan: &RoutePlan) -> bool {
    plan.distance_km.is_finite()
        && plan.distance_km >= 0.0
        && plan.duration_min.is_finite()
        && plan.duration_min >= 0.0
}

/// Delivery route lifecycle: `active -> completed | cancelled`.
pub struct RouteTracker {
    routes: Arc<dyn RouteRepository>,
    provider: Arc<dyn RouteProvider>,
    sessions: Arc<SessionTracker>,
    fallback_speed_kmh: f64,
    metrics: Metrics,
}

impl RouteTracker {
    pub fn new(
        routes: Arc<dyn RouteRepository>,
        provider: Arc<dyn RouteProvider>,
        sessions: Arc<SessionTracker>,
        fallback_speed_kmh: f64,
        metrics: Metrics,
    ) -> Self {
        Self {
            routes,
            provider,
            sessions,
            fallback_speed_kmh,
            metrics,
        }
    }

    pub async fn create_route(
        &self,
        order_id: &str,
        driver_id: &str,
        pickup: GeoPoint,
        dropoff: GeoPoint,
    ) -> Result<DeliveryRoute, AppError> {
        if order_id.trim().is_empty() {
            return Err(AppError::Validation("order id cannot be empty".to_string()));
        }
        if driver_id.trim().is_empty() {
            return Err(AppError::Validation("driver id cannot be empty".to_string()));
        }
        pickup.validate()?;
        dropoff.validate()?;

        let plan = match self.provider.plan_route(&pickup, &dropoff).await {
            Ok(plan) if is_usable(&plan) => plan,
            Ok(_) => {
                warn!(order_id, "route provider returned an unusable plan; using straight line");
                straight_line_plan(&pickup, &dropoff)
            }
            Err(err) => {
                warn!(order_id, error = %err, "route provider failed; using straight line");
                straight_line_plan(&pickup, &dropoff)
            }
        };

        let now = Utc::now();
        let route = DeliveryRoute {
            id: Uuid::new_v4(),
            order_id: order_id.to_string(),
            driver_id: driver_id.to_string(),
            pickup,
            dropoff,
            current_location: None,
            route_points: plan.points,
            status: RouteStatus::Active,
            estimated_distance_km: plan.distance_km,
            estimated_duration_min: plan.duration_min,
            actual_distance_km: 0.0,
            actual_duration_min: None,
            started_at: now,
            completed_at: None,
            updated_at: now,
        };

        let route = self.routes.create(route).await.map_err(|err| match err {
            AppError::Persistence(msg) => AppError::RouteCreation(msg),
            other => other,
        })?;
        self.metrics.active_routes.inc();

        if let Err(err) = self
            .sessions
            .start(driver_id, Some(order_id.to_string()))
            .await
        {
            warn!(order_id, driver_id, error = %err, "failed to start tracking for route");
        }

        info!(
            order_id,
            driver_id,
            estimated_distance_km = route.estimated_distance_km,
            estimated_duration_min = route.estimated_duration_min,
            "route created"
        );
        Ok(route)
    }

    /// `actual_distance_km` is the beeline from pickup to the current point,
    /// not the path length travelled.
    pub async fn update_progress(
        &self,
        order_id: &str,
        current_location: GeoPoint,
    ) -> Result<DeliveryRoute, AppError> {
        current_location.validate()?;

        let mut route = self.get_route(order_id).await?;
        if route.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "route for order {order_id} is {:?}; progress not accepted",
                route.status
            )));
        }

        route.actual_distance_km = haversine_km(&route.pickup, &current_location);
        route.current_location = Some(current_location);
        route.updated_at = Utc::now();

        self.routes.update(route).await
    }

    /// Completing a route twice is a `Conflict`, as is completing a cancelled one.
    pub async fn complete_route(&self, order_id: &str) -> Result<DeliveryRoute, AppError> {
        self.routes.mark_complete(order_id).await?;
        self.metrics.active_routes.dec();

        let route = self.get_route(order_id).await?;
        self.close_session(&route).await;

        info!(
            order_id,
            driver_id = %route.driver_id,
            actual_duration_min = ?route.actual_duration_min,
            "route completed"
        );
        Ok(route)
    }

    pub async fn cancel_route(&self, order_id: &str) -> Result<DeliveryRoute, AppError> {
        self.routes.mark_cancelled(order_id).await?;
        self.metrics.active_routes.dec();

        let route = self.get_route(order_id).await?;
        self.close_session(&route).await;

        info!(order_id, driver_id = %route.driver_id, "route cancelled");
        Ok(route)
    }

    pub async fn get_route(&self, order_id: &str) -> Result<DeliveryRoute, AppError> {
        self.routes
            .get_by_order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("route for order {order_id} not found")))
    }

    pub async fn get_active_routes(&self) -> Result<Vec<DeliveryRoute>, AppError> {
        self.routes.get_all_active().await
    }

    pub async fn routes_for_driver(&self, driver_id: &str) -> Result<Vec<DeliveryRoute>, AppError> {
        self.routes.get_by_driver(driver_id).await
    }

    /// Applies `location` to every active route of the driver. A route that
    /// fails to update is logged and skipped; the rest still advance.
    pub async fn advance_driver(
        &self,
        driver_id: &str,
        location: &GeoPoint,
    ) -> Result<Vec<DeliveryRoute>, AppError> {
        let active: Vec<DeliveryRoute> = self
            .routes
            .get_by_driver(driver_id)
            .await?
            .into_iter()
            .filter(|route| route.status == RouteStatus::Active)
            .collect();

        let mut updated = Vec::with_capacity(active.len());
        for route in active {
            match self.update_progress(&route.order_id, location.clone()).await {
                Ok(route) => updated.push(route),
                Err(err) => warn!(
                    driver_id,
                    order_id = %route.order_id,
                    error = %err,
                    "route progress skipped"
                ),
            }
        }
        Ok(updated)
    }

    /// ETA from the driver's last known point (or pickup) to dropoff.
    pub async fn estimate_arrival(&self, order_id: &str) -> Result<ArrivalEstimate, AppError> {
        let route = self.get_route(order_id).await?;
        let origin = route.current_location.as_ref().unwrap_or(&route.pickup);

        match self.provider.estimate_arrival(origin, &route.dropoff).await {
            Ok(estimate) => Ok(estimate),
            Err(err) => {
                warn!(order_id, error = %err, "eta provider failed; using straight line");
                let distance_km = haversine_km(origin, &route.dropoff);
                let duration_min = distance_km / self.fallback_speed_kmh * 60.0;
                let arrival_time = Duration::try_milliseconds((duration_min * 60_000.0) as i64)
                    .and_then(|eta| Utc::now().checked_add_signed(eta))
                    .ok_or_else(|| {
                        AppError::Internal(format!(
                            "arrival {duration_min} min out is not representable"
                        ))
                    })?;
                Ok(ArrivalEstimate {
                    duration_min,
                    distance_km,
                    arrival_time,
                })
            }
        }
    }

    async fn close_session(&self, route: &DeliveryRoute) {
        if let Err(err) = self
            .sessions
            .stop_for_order(&route.driver_id, &route.order_id)
            .await
        {
            warn!(
                order_id = %route.order_id,
                driver_id = %route.driver_id,
                error = %err,
                "failed to close tracking session for route"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::models::route::OrderId;
    use crate::external::OfflineRouteProvider;
    use crate::repository::{
        InMemoryHistoryRepository, InMemoryPositionRepository, InMemoryRouteRepository,
    };

    struct FixedProvider;

    #[async_trait]
    impl RouteProvider for FixedProvider {
        async fn plan_route(&self, origin: &GeoPoint, dest: &GeoPoint) -> Result<RoutePlan, AppError> {
            Ok(RoutePlan {
                distance_km: 18.5,
                duration_min: 22.0,
                points: vec![origin.clone(), GeoPoint::new(40.05, -3.05), dest.clone()],
            })
        }

        async fn estimate_arrival(
            &self,
            _origin: &GeoPoint,
            _dest: &GeoPoint,
        ) -> Result<ArrivalEstimate, AppError> {
            Ok(ArrivalEstimate {
                duration_min: 12.0,
                distance_km: 9.0,
                arrival_time: Utc::now() + Duration::minutes(12),
            })
        }

        async fn reverse_geocode(&self, _point: &GeoPoint) -> Result<String, AppError> {
            Ok("Calle Mayor 1".to_string())
        }
    }

    fn tracker_with(provider: Arc<dyn RouteProvider>) -> (RouteTracker, Arc<SessionTracker>) {
        let sessions = Arc::new(SessionTracker::new(
            Arc::new(InMemoryHistoryRepository::new()),
            Arc::new(InMemoryPositionRepository::new()),
        ));
        let tracker = RouteTracker::new(
            Arc::new(InMemoryRouteRepository::new()),
            provider,
            sessions.clone(),
            30.0,
            Metrics::new(),
        );
        (tracker, sessions)
    }

    #[tokio::test]
    async fn failing_provider_falls_back_to_straight_line() {
        let (tracker, sessions) = tracker_with(Arc::new(OfflineRouteProvider));
        let pickup = GeoPoint::new(40.0, -3.0);
        let dropoff = GeoPoint::new(40.1, -3.1);

        let route = tracker
            .create_route("o1", "d1", pickup.clone(), dropoff.clone())
            .await
            .unwrap();

        assert_eq!(route.status, RouteStatus::Active);
        assert_eq!(route.estimated_distance_km, haversine_km(&pickup, &dropoff));
        assert_eq!(route.estimated_duration_min, 30.0);
        assert_eq!(route.actual_distance_km, 0.0);
        assert_eq!(route.route_points.len(), 2);

        let session = sessions.open_session("d1").await.unwrap().unwrap();
        assert_eq!(session.order_id.as_deref(), Some("o1"));
    }

    #[tokio::test]
    async fn provider_plan_is_used_when_available() {
        let (tracker, _) = tracker_with(Arc::new(FixedProvider));
        let route = tracker
            .create_route("o1", "d1", GeoPoint::new(40.0, -3.0), GeoPoint::new(40.1, -3.1))
            .await
            .unwrap();

        assert_eq!(route.estimated_distance_km, 18.5);
        assert_eq!(route.estimated_duration_min, 22.0);
        assert_eq!(route.route_points.len(), 3);
    }

    #[tokio::test]
    async fn duplicate_order_is_a_conflict() {
        let (tracker, _) = tracker_with(Arc::new(OfflineRouteProvider));
        let pickup = GeoPoint::new(40.0, -3.0);
        let dropoff = GeoPoint::new(40.1, -3.1);

        tracker
            .create_route("o1", "d1", pickup.clone(), dropoff.clone())
            .await
            .unwrap();
        let err = tracker
            .create_route("o1", "d2", pickup, dropoff)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn progress_measures_beeline_from_pickup() {
        let (tracker, _) = tracker_with(Arc::new(OfflineRouteProvider));
        let pickup = GeoPoint::new(40.0, -3.0);
        tracker
            .create_route("o1", "d1", pickup.clone(), GeoPoint::new(40.1, -3.1))
            .await
            .unwrap();

        let current = GeoPoint::new(40.05, -3.02);
        let route = tracker.update_progress("o1", current.clone()).await.unwrap();

        assert_eq!(route.actual_distance_km, haversine_km(&pickup, &current));
        assert_eq!(route.current_location.unwrap().lat, 40.05);
    }

    #[tokio::test]
    async fn progress_on_unknown_order_is_not_found() {
        let (tracker, _) = tracker_with(Arc::new(OfflineRouteProvider));
        let err = tracker
            .update_progress("missing", GeoPoint::new(40.0, -3.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn completion_is_terminal() {
        let (tracker, sessions) = tracker_with(Arc::new(OfflineRouteProvider));
        tracker
            .create_route("o1", "d1", GeoPoint::new(40.0, -3.0), GeoPoint::new(40.1, -3.1))
            .await
            .unwrap();

        let route = tracker.complete_route("o1").await.unwrap();
        assert_eq!(route.status, RouteStatus::Completed);
        assert!(route.completed_at.is_some());
        assert!(route.actual_duration_min.is_some());
        assert!(sessions.open_session("d1").await.unwrap().is_none());

        assert!(matches!(
            tracker.complete_route("o1").await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            tracker.cancel_route("o1").await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            tracker.update_progress("o1", GeoPoint::new(40.05, -3.05)).await,
            Err(AppError::Conflict(_))
        ));
        assert!(tracker.get_active_routes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn completing_unknown_order_is_not_found() {
        let (tracker, _) = tracker_with(Arc::new(OfflineRouteProvider));
        assert!(matches!(
            tracker.complete_route("nope").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn advance_driver_touches_only_active_routes() {
        let (tracker, _) = tracker_with(Arc::new(OfflineRouteProvider));
        tracker
            .create_route("o1", "d1", GeoPoint::new(40.0, -3.0), GeoPoint::new(40.1, -3.1))
            .await
            .unwrap();
        tracker
            .create_route("o2", "d1", GeoPoint::new(40.0, -3.0), GeoPoint::new(40.2, -3.2))
            .await
            .unwrap();
        tracker.cancel_route("o2").await.unwrap();

        let updated = tracker
            .advance_driver("d1", &GeoPoint::new(40.03, -3.0))
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].order_id, "o1");
    }

    #[tokio::test]
    async fn eta_falls_back_to_configured_speed() {
        let (tracker, _) = tracker_with(Arc::new(OfflineRouteProvider));
        let pickup = GeoPoint::new(40.0, -3.0);
        let dropoff = GeoPoint::new(40.1, -3.1);
        tracker
            .create_route("o1", "d1", pickup.clone(), dropoff.clone())
            .await
            .unwrap();

        let estimate = tracker.estimate_arrival("o1").await.unwrap();
        let distance = haversine_km(&pickup, &dropoff);
        assert!((estimate.distance_km - distance).abs() < 1e-9);
        assert!((estimate.duration_min - distance / 30.0 * 60.0).abs() < 1e-9);
    }

    /// Fails every write for one order, as if it were completed concurrently.
    struct RejectsOrder {
        inner: InMemoryRouteRepository,
        rejected: OrderId,
    }

    #[async_trait]
    impl RouteRepository for RejectsOrder {
        async fn create(&self, route: DeliveryRoute) -> Result<DeliveryRoute, AppError> {
            self.inner.create(route).await
        }

        async fn get_by_id(&self, id: Uuid) -> Result<Option<DeliveryRoute>, AppError> {
            self.inner.get_by_id(id).await
        }

        async fn get_by_order(&self, order_id: &str) -> Result<Option<DeliveryRoute>, AppError> {
            self.inner.get_by_order(order_id).await
        }

        async fn get_by_driver(&self, driver_id: &str) -> Result<Vec<DeliveryRoute>, AppError> {
            self.inner.get_by_driver(driver_id).await
        }

        async fn get_all_active(&self) -> Result<Vec<DeliveryRoute>, AppError> {
            self.inner.get_all_active().await
        }

        async fn update(&self, route: DeliveryRoute) -> Result<DeliveryRoute, AppError> {
            if route.order_id == self.rejected {
                return Err(AppError::Conflict(format!(
                    "route for order {} is already Completed",
                    route.order_id
                )));
            }
            self.inner.update(route).await
        }

        async fn mark_complete(&self, order_id: &str) -> Result<(), AppError> {
            self.inner.mark_complete(order_id).await
        }

        async fn mark_cancelled(&self, order_id: &str) -> Result<(), AppError> {
            self.inner.mark_cancelled(order_id).await
        }

        async fn delete(&self, order_id: &str) -> Result<(), AppError> {
            self.inner.delete(order_id).await
        }
    }

    #[tokio::test]
    async fn advance_driver_keeps_going_past_a_failed_route() {
        let sessions = Arc::new(SessionTracker::new(
            Arc::new(InMemoryHistoryRepository::new()),
            Arc::new(InMemoryPositionRepository::new()),
        ));
        let tracker = RouteTracker::new(
            Arc::new(RejectsOrder {
                inner: InMemoryRouteRepository::new(),
                rejected: "o1".to_string(),
            }),
            Arc::new(OfflineRouteProvider),
            sessions,
            30.0,
            Metrics::new(),
        );
        for order_id in ["o1", "o2"] {
            tracker
                .create_route(order_id, "d1", GeoPoint::new(40.0, -3.0), GeoPoint::new(40.1, -3.1))
                .await
                .unwrap();
        }

        let updated = tracker
            .advance_driver("d1", &GeoPoint::new(40.03, -3.0))
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].order_id, "o2");
    }

    #[tokio::test]
    async fn eta_with_tiny_fallback_speed_is_an_error_not_a_panic() {
        let sessions = Arc::new(SessionTracker::new(
            Arc::new(InMemoryHistoryRepository::new()),
            Arc::new(InMemoryPositionRepository::new()),
        ));
        let tracker = RouteTracker::new(
            Arc::new(InMemoryRouteRepository::new()),
            Arc::new(OfflineRouteProvider),
            sessions,
            1e-12,
            Metrics::new(),
        );
        tracker
            .create_route("o1", "d1", GeoPoint::new(40.0, -3.0), GeoPoint::new(40.1, -3.1))
            .await
            .unwrap();

        assert!(tracker.estimate_arrival("o1").await.is_err());
    }

    #[tokio::test]
    async fn eta_uses_provider_when_available() {
        let (tracker, _) = tracker_with(Arc::new(FixedProvider));
        tracker
            .create_route("o1", "d1", GeoPoint::new(40.0, -3.0), GeoPoint::new(40.1, -3.1))
            .await
            .unwrap();

        let estimate = tracker.estimate_arrival("o1").await.unwrap();
        assert_eq!(estimate.duration_min, 12.0);
    }
}
