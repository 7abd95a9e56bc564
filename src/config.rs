use std::env;
use std::time::Duration;

use crate::engine::geofence::AlertMode;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub driver_queue_size: usize,
    pub driver_idle_secs: u64,
    pub geofence_alert_mode: AlertMode,
    pub fallback_speed_kmh: f64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            driver_queue_size: parse_or_default("DRIVER_QUEUE_SIZE", 64)?,
            driver_idle_secs: parse_or_default("DRIVER_IDLE_SECS", 30)?,
            geofence_alert_mode: parse_or_default("GEOFENCE_ALERT_MODE", AlertMode::Continuous)?,
            fallback_speed_kmh: parse_or_default("FALLBACK_SPEED_KMH", 30.0)?,
        };

        if config.driver_queue_size == 0 {
            return Err(AppError::Internal(
                "invalid DRIVER_QUEUE_SIZE: must be > 0".to_string(),
            ));
        }
        if !(config.fallback_speed_kmh.is_finite() && config.fallback_speed_kmh > 0.0) {
            return Err(AppError::Internal(
                "invalid FALLBACK_SPEED_KMH: must be > 0".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn driver_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.driver_idle_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            event_buffer_size: 1024,
            driver_queue_size: 64,
            driver_idle_secs: 30,
            geofence_alert_mode: AlertMode::Continuous,
            fallback_speed_kmh: 30.0,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
