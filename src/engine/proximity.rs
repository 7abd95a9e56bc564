use std::sync::Arc;

use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::position::{DriverStatus, GeoPoint, NearbyDriver};
use crate::repository::PositionRepository;

pub const DEFAULT_NEARBY_LIMIT: usize = 10;

pub struct ProximitySearch {
    positions: Arc<dyn PositionRepository>,
}

impl ProximitySearch {
    pub fn new(positions: Arc<dyn PositionRepository>) -> Self {
        Self { positions }
    }

    /// Nearest eligible drivers within `radius_km` of `center`.
    ///
    /// An empty `statuses` means the default filter (`online`, `stopped`);
    /// a `limit` of zero means [`DEFAULT_NEARBY_LIMIT`]. Distances are
    /// great-circle kilometers.
    pub async fn find_nearby(
        &self,
        center: &GeoPoint,
        radius_km: f64,
        statuses: &[DriverStatus],
        limit: usize,
    ) -> Result<Vec<NearbyDriver>, AppError> {
        center.validate()?;
        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(AppError::Validation(format!(
                "radius {radius_km} km must be > 0"
            )));
        }

        let limit = if limit == 0 { DEFAULT_NEARBY_LIMIT } else { limit };
        let default_filter;
        let statuses = if statuses.is_empty() {
            default_filter = DriverStatus::default_search_filter();
            default_filter.as_slice()
        } else {
            statuses
        };

        let candidates = self
            .positions
            .find_nearby(center, radius_km * 1000.0, statuses, limit)
            .await?;

        let mut nearby: Vec<NearbyDriver> = candidates
            .into_iter()
            .filter(|position| statuses.contains(&position.status))
            .map(|position| NearbyDriver {
                distance_km: haversine_km(center, &position.location),
                driver_id: position.driver_id,
                location: position.location,
                status: position.status,
            })
            .filter(|driver| driver.distance_km <= radius_km)
            .collect();

        nearby.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        nearby.truncate(limit);
        Ok(nearby)
    }
}
