pub mod analytics;
pub mod geofence;
pub mod history;
pub mod position;
pub mod route;
