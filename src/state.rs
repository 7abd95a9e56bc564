use std::sync::Arc;

use crate::config::Config;
use crate::engine::analytics::AnalyticsAggregator;
use crate::engine::geofence::GeofenceEvaluator;
use crate::engine::ingest::{PositionEffects, PositionIngestor};
use crate::engine::proximity::ProximitySearch;
use crate::engine::queue::DriverQueue;
use crate::engine::route::RouteTracker;
use crate::engine::tracking::SessionTracker;
use crate::external::{BroadcastNotifier, OfflineRouteProvider, RouteProvider};
use crate::observability::metrics::Metrics;
use crate::repository::{
    GeofenceRepository, HistoryRepository, InMemoryGeofenceRepository, InMemoryHistoryRepository,
    InMemoryPositionRepository, InMemoryRouteRepository, PositionRepository, RouteRepository,
};

pub struct AppState {
    pub positions: Arc<dyn PositionRepository>,
    pub geofences: Arc<dyn GeofenceRepository>,
    pub ingestor: PositionIngestor,
    pub proximity: ProximitySearch,
    pub geofence_evaluator: Arc<GeofenceEvaluator>,
    pub route_tracker: Arc<RouteTracker>,
    pub sessions: Arc<SessionTracker>,
    pub analytics: AnalyticsAggregator,
    pub queue: Arc<DriverQueue>,
    pub notifier: Arc<BroadcastNotifier>,
    pub metrics: Metrics,
}

impl AppState {
    /// In-memory repositories and no maps service.
    pub fn new(config: &Config) -> Self {
        Self::with_provider(config, Arc::new(OfflineRouteProvider))
    }

    pub fn with_provider(config: &Config, provider: Arc<dyn RouteProvider>) -> Self {
        let metrics = Metrics::new();

        let positions: Arc<dyn PositionRepository> = Arc::new(InMemoryPositionRepository::new());
        let history: Arc<dyn HistoryRepository> = Arc::new(InMemoryHistoryRepository::new());
        let routes: Arc<dyn RouteRepository> = Arc::new(InMemoryRouteRepository::new());
        let geofences: Arc<dyn GeofenceRepository> = Arc::new(InMemoryGeofenceRepository::new());

        let notifier = Arc::new(BroadcastNotifier::new(config.event_buffer_size));

        let sessions = Arc::new(SessionTracker::new(history.clone(), positions.clone()));
        let geofence_evaluator = Arc::new(GeofenceEvaluator::new(
            geofences.clone(),
            notifier.clone(),
            config.geofence_alert_mode,
            metrics.clone(),
        ));
        let route_tracker = Arc::new(RouteTracker::new(
            routes.clone(),
            provider,
            sessions.clone(),
            config.fallback_speed_kmh,
            metrics.clone(),
        ));

        let effects = Arc::new(PositionEffects::new(
            geofence_evaluator.clone(),
            route_tracker.clone(),
            sessions.clone(),
        ));
        let queue = Arc::new(DriverQueue::new(
            effects,
            config.driver_queue_size,
            config.driver_idle_timeout(),
            metrics.clone(),
        ));

        Self {
            ingestor: PositionIngestor::new(positions.clone(), queue.clone(), metrics.clone()),
            proximity: ProximitySearch::new(positions.clone()),
            analytics: AnalyticsAggregator::new(history, routes),
            positions,
            geofences,
            geofence_evaluator,
            route_tracker,
            sessions,
            queue,
            notifier,
            metrics,
        }
    }
}
