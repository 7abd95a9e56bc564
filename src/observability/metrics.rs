use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub positions_reported_total: IntCounter,
    pub geofence_events_total: IntCounterVec,
    pub background_jobs_total: IntCounterVec,
    pub background_job_latency_seconds: HistogramVec,
    pub active_routes: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let positions_reported_total = IntCounter::new(
            "positions_reported_total",
            "Total driver position samples accepted",
        )
        .expect("valid positions_reported_total metric");

        let geofence_events_total = IntCounterVec::new(
            Opts::new("geofence_events_total", "Geofence events emitted by type"),
            &["type"],
        )
        .expect("valid geofence_events_total metric");

        let background_jobs_total = IntCounterVec::new(
            Opts::new(
                "background_jobs_total",
                "Per-driver background jobs by outcome",
            ),
            &["outcome"],
        )
        .expect("valid background_jobs_total metric");

        let background_job_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "background_job_latency_seconds",
                "Latency of per-driver background jobs in seconds",
            ),
            &["outcome"],
        )
        .expect("valid background_job_latency_seconds metric");

        let active_routes = IntGauge::new("active_routes", "Delivery routes currently active")
            .expect("valid active_routes metric");

        registry
            .register(Box::new(positions_reported_total.clone()))
            .expect("register positions_reported_total");
        registry
            .register(Box::new(geofence_events_total.clone()))
            .expect("register geofence_events_total");
        registry
            .register(Box::new(background_jobs_total.clone()))
            .expect("register background_jobs_total");
        registry
            .register(Box::new(background_job_latency_seconds.clone()))
            .expect("register background_job_latency_seconds");
        registry
            .register(Box::new(active_routes.clone()))
            .expect("register active_routes");

        Self {
            registry,
            positions_reported_total,
            geofence_events_total,
            background_jobs_total,
            background_job_latency_seconds,
            active_routes,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
