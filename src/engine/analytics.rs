use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::analytics::{DriverStats, SystemStats};
use crate::models::history::LocationHistory;
use crate::repository::{HistoryRepository, RouteRepository};

pub struct AnalyticsAggregator {
    history: Arc<dyn HistoryRepository>,
    routes: Arc<dyn RouteRepository>,
}

impl AnalyticsAggregator {
    pub fn new(history: Arc<dyn HistoryRepository>, routes: Arc<dyn RouteRepository>) -> Self {
        Self { history, routes }
    }

    pub async fn driver_stats(
        &self,
        driver_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<DriverStats, AppError> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(AppError::Validation(format!(
                    "window start {start} is after end {end}"
                )));
            }
        }

        let sessions = self.history.get_by_driver(driver_id, start, end).await?;
        Ok(summarize(driver_id, start, end, &sessions))
    }

    /// `average_delivery_time_min` averages over *active* routes that already
    /// carry an actual duration, which in practice is rarely any of them.
    pub async fn system_stats(&self) -> Result<SystemStats, AppError> {
        let active = self.routes.get_all_active().await?;

        let durations: Vec<f64> = active
            .iter()
            .filter_map(|route| route.actual_duration_min)
            .collect();
        let average_delivery_time_min = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<f64>() / durations.len() as f64
        };

        Ok(SystemStats {
            active_deliveries: active.len(),
            average_delivery_time_min,
            generated_at: Utc::now(),
        })
    }
}

fn summarize(
    driver_id: &str,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    sessions: &[LocationHistory],
) -> DriverStats {
    let total_distance_km: f64 = sessions.iter().map(|s| s.distance_km).sum();
    let total_duration_secs: f64 = sessions.iter().map(|s| s.duration_secs).sum();
    let total_deliveries = sessions.iter().filter(|s| s.order_id.is_some()).count();

    let average_speed_kmh = if total_duration_secs > 0.0 {
        total_distance_km / (total_duration_secs / 3600.0)
    } else {
        0.0
    };

    DriverStats {
        driver_id: driver_id.to_string(),
        start,
        end,
        sessions: sessions.len(),
        total_distance_km,
        total_duration_secs,
        total_deliveries,
        average_speed_kmh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryHistoryRepository, InMemoryRouteRepository};

    fn session(driver_id: &str, order_id: Option<&str>, km: f64, secs: f64) -> LocationHistory {
        let mut session =
            LocationHistory::open(driver_id.to_string(), order_id.map(str::to_string));
        session.distance_km = km;
        session.duration_secs = secs;
        session.end_time = Some(Utc::now());
        session
    }

    #[tokio::test]
    async fn driver_stats_sum_sessions() {
        let history = Arc::new(InMemoryHistoryRepository::new());
        history
            .create(session("d1", Some("o1"), 5.0, 1800.0))
            .await
            .unwrap();
        history.create(session("d1", None, 3.0, 1200.0)).await.unwrap();
        history
            .create(session("d2", Some("o2"), 40.0, 100.0))
            .await
            .unwrap();

        let aggregator =
            AnalyticsAggregator::new(history, Arc::new(InMemoryRouteRepository::new()));
        let stats = aggregator.driver_stats("d1", None, None).await.unwrap();

        assert_eq!(stats.sessions, 2);
        assert_eq!(stats.total_distance_km, 8.0);
        assert_eq!(stats.total_duration_secs, 3000.0);
        assert_eq!(stats.total_deliveries, 1);
        assert!((stats.average_speed_kmh - 9.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn zero_duration_yields_zero_speed() {
        let history = Arc::new(InMemoryHistoryRepository::new());
        history.create(session("d1", None, 2.0, 0.0)).await.unwrap();

        let aggregator =
            AnalyticsAggregator::new(history, Arc::new(InMemoryRouteRepository::new()));
        let stats = aggregator.driver_stats("d1", None, None).await.unwrap();
        assert_eq!(stats.average_speed_kmh, 0.0);
    }

    #[tokio::test]
    async fn inverted_window_is_rejected() {
        let aggregator = AnalyticsAggregator::new(
            Arc::new(InMemoryHistoryRepository::new()),
            Arc::new(InMemoryRouteRepository::new()),
        );
        let now = Utc::now();
        let err = aggregator
            .driver_stats("d1", Some(now), Some(now - chrono::Duration::hours(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn system_stats_with_no_routes() {
        let aggregator = AnalyticsAggregator::new(
            Arc::new(InMemoryHistoryRepository::new()),
            Arc::new(InMemoryRouteRepository::new()),
        );
        let stats = aggregator.system_stats().await.unwrap();
        assert_eq!(stats.active_deliveries, 0);
        assert_eq!(stats.average_delivery_time_min, 0.0);
    }
}
