use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashSet;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::external::NotificationChannel;
use crate::models::geofence::{GeofenceEvent, GeofenceEventType};
use crate::models::position::{DriverId, GeoPoint};
use crate::observability::metrics::Metrics;
use crate::repository::GeofenceRepository;

/// How containment turns into events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertMode {
    /// `Enter` on every evaluation while inside; never `Exit`.
    Continuous,
    /// `Enter` once on crossing in, `Exit` once on crossing out.
    Transition,
}

impl FromStr for AlertMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "continuous" => Ok(AlertMode::Continuous),
            "transition" => Ok(AlertMode::Transition),
            other => Err(format!(
                "unknown alert mode: {other}, expected continuous/transition"
            )),
        }
    }
}

impl fmt::Display for AlertMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertMode::Continuous => f.write_str("continuous"),
            AlertMode::Transition => f.write_str("transition"),
        }
    }
}

pub struct GeofenceEvaluator {
    geofences: Arc<dyn GeofenceRepository>,
    notifier: Arc<dyn NotificationChannel>,
    mode: AlertMode,
    // (driver, geofence) pairs last seen inside; only used in Transition mode.
    inside: DashSet<(DriverId, Uuid)>,
    metrics: Metrics,
}

impl GeofenceEvaluator {
    pub fn new(
        geofences: Arc<dyn GeofenceRepository>,
        notifier: Arc<dyn NotificationChannel>,
        mode: AlertMode,
        metrics: Metrics,
    ) -> Self {
        Self {
            geofences,
            notifier,
            mode,
            inside: DashSet::new(),
            metrics,
        }
    }

    pub fn mode(&self) -> AlertMode {
        self.mode
    }

    /// Tests `location` against every active geofence and hands each
    /// resulting event to the notification channel without waiting.
    pub async fn evaluate(
        &self,
        driver_id: &str,
        location: &GeoPoint,
    ) -> Result<Vec<GeofenceEvent>, AppError> {
        let geofences = self.geofences.get_all().await?;
        let now = Utc::now();

        let events: Vec<GeofenceEvent> = geofences
            .iter()
            .filter(|geofence| geofence.is_active)
            .filter_map(|geofence| {
                let contained = geofence.geometry.contains(location);
                self.classify(driver_id, geofence.id, contained)
                    .map(|kind| GeofenceEvent {
                        driver_id: driver_id.to_string(),
                        geofence_id: geofence.id,
                        kind,
                        location: location.clone(),
                        timestamp: now,
                    })
            })
            .collect();

        if self.mode == AlertMode::Transition {
            // A zone that went inactive or was deleted no longer holds the driver,
            // so a later return to it reads as a fresh enter.
            let active: HashSet<Uuid> = geofences
                .iter()
                .filter(|geofence| geofence.is_active)
                .map(|geofence| geofence.id)
                .collect();
            self.inside
                .retain(|(driver, geofence_id)| driver != driver_id || active.contains(geofence_id));
        }

        debug!(
            driver_id,
            checked = geofences.len(),
            emitted = events.len(),
            "geofences evaluated"
        );

        for event in &events {
            self.dispatch(event.clone());
        }

        Ok(events)
    }

    /// Drops remembered containment for a driver that left the system.
    pub fn forget_driver(&self, driver_id: &str) {
        self.inside.retain(|(driver, _)| driver != driver_id);
    }

    /// Drops remembered containment for a deleted geofence.
    pub fn forget_geofence(&self, geofence_id: Uuid) {
        self.inside.retain(|(_, id)| *id != geofence_id);
    }

    fn classify(
        &self,
        driver_id: &str,
        geofence_id: Uuid,
        contained: bool,
    ) -> Option<GeofenceEventType> {
        match self.mode {
            AlertMode::Continuous => contained.then_some(GeofenceEventType::Enter),
            AlertMode::Transition => {
                let key = (driver_id.to_string(), geofence_id);
                if contained {
                    self.inside.insert(key).then_some(GeofenceEventType::Enter)
                } else {
                    self.inside.remove(&key).map(|_| GeofenceEventType::Exit)
                }
            }
        }
    }

    fn dispatch(&self, event: GeofenceEvent) {
        let label = match event.kind {
            GeofenceEventType::Enter => "enter",
            GeofenceEventType::Exit => "exit",
        };
        self.metrics
            .geofence_events_total
            .with_label_values(&[label])
            .inc();

        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            let driver_id = event.driver_id.clone();
            let geofence_id = event.geofence_id;
            if let Err(err) = notifier.send_geofence_alert(event).await {
                warn!(
                    driver_id = %driver_id,
                    geofence_id = %geofence_id,
                    error = %err,
                    "geofence alert not delivered"
                );
            }
        });
    }
}
