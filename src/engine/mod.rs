pub mod analytics;
pub mod geofence;
pub mod ingest;
pub mod proximity;
pub mod queue;
pub mod route;
pub mod tracking;
