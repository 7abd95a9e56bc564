use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::AppError;
use crate::models::geofence::GeofenceEvent;
use crate::models::position::DriverId;

/// Best-effort alert delivery. Callers never retry and never wait on the
/// outcome beyond logging it.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send_geofence_alert(&self, event: GeofenceEvent) -> Result<(), AppError>;

    async fn send_location_alert(&self, driver_id: &str, message: &str) -> Result<(), AppError>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    Geofence(GeofenceEvent),
    Location { driver_id: DriverId, message: String },
}

/// Publishes alerts to in-process subscribers (the websocket feed).
/// Having no subscriber is not a delivery failure.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Alert>,
}

impl BroadcastNotifier {
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _unused_rx) = broadcast::channel(buffer_size.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.tx.subscribe()
    }

    fn publish(&self, alert: Alert) {
        let receivers = self.tx.send(alert).unwrap_or(0);
        debug!(receivers, "alert published");
    }
}

#[async_trait]
impl NotificationChannel for BroadcastNotifier {
    async fn send_geofence_alert(&self, event: GeofenceEvent) -> Result<(), AppError> {
        info!(
            driver_id = %event.driver_id,
            geofence_id = %event.geofence_id,
            kind = ?event.kind,
            "geofence alert"
        );
        self.publish(Alert::Geofence(event));
        Ok(())
    }

    async fn send_location_alert(&self, driver_id: &str, message: &str) -> Result<(), AppError> {
        info!(driver_id, message, "location alert");
        self.publish(Alert::Location {
            driver_id: driver_id.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::models::geofence::GeofenceEventType;
    use crate::models::position::GeoPoint;

    #[tokio::test]
    async fn subscribers_receive_geofence_alerts() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();

        let event = GeofenceEvent {
            driver_id: "d1".to_string(),
            geofence_id: Uuid::new_v4(),
            kind: GeofenceEventType::Enter,
            location: GeoPoint::new(40.0, -3.0),
            timestamp: Utc::now(),
        };
        notifier.send_geofence_alert(event.clone()).await.unwrap();

        match rx.recv().await.unwrap() {
            Alert::Geofence(received) => assert_eq!(received.geofence_id, event.geofence_id),
            other => panic!("unexpected alert: {other:?}"),
        }
    }

    #[tokio::test]
    async fn publishing_without_subscribers_succeeds() {
        let notifier = BroadcastNotifier::new(8);
        assert!(notifier.send_location_alert("d1", "left zone").await.is_ok());
    }
}
