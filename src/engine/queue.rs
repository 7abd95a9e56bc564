//! Per-driver background work queue.
//!
//! Every driver gets its own bounded channel and a single worker task, so the
//! side effects of successive position reports from one driver apply in
//! order while different drivers proceed in parallel. Workers are created on
//! first dispatch and retire after sitting idle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, warn};

use crate::error::AppError;
use crate::models::position::{DriverId, GeoPoint};
use crate::observability::metrics::Metrics;

#[async_trait]
pub trait DriverJobHandler: Send + Sync + 'static {
    async fn handle(&self, driver_id: &str, point: GeoPoint) -> Result<(), AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Queued,
    /// The driver's queue was full; the job was discarded.
    Dropped,
}

pub struct DriverQueue {
    workers: Arc<DashMap<DriverId, mpsc::Sender<GeoPoint>>>,
    handler: Arc<dyn DriverJobHandler>,
    capacity: usize,
    idle_timeout: Duration,
    metrics: Metrics,
}

impl DriverQueue {
    pub fn new(
        handler: Arc<dyn DriverJobHandler>,
        capacity: usize,
        idle_timeout: Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            workers: Arc::new(DashMap::new()),
            handler,
            capacity: capacity.max(1),
            idle_timeout,
            metrics,
        }
    }

    /// Never waits. Must be called from within a tokio runtime.
    pub fn dispatch(&self, driver_id: &str, point: GeoPoint) -> DispatchOutcome {
        // Sends happen under the map entry lock; a retiring worker removes
        // itself under the same lock, so nothing is sent to a channel whose
        // worker has already drained it.
        let result = match self.workers.entry(driver_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let sent = entry.get().try_send(point);
                match sent {
                    Err(TrySendError::Closed(point)) => {
                        warn!(driver_id, "driver worker gone; restarting");
                        let tx = self.spawn_worker(driver_id);
                        let result = tx.try_send(point);
                        entry.insert(tx);
                        result
                    }
                    other => other,
                }
            }
            Entry::Vacant(slot) => {
                let tx = self.spawn_worker(driver_id);
                let result = tx.try_send(point);
                slot.insert(tx);
                result
            }
        };

        match result {
            Ok(()) => DispatchOutcome::Queued,
            Err(err) => {
                warn!(driver_id, error = %err, "driver queue rejected job; dropping");
                self.metrics
                    .background_jobs_total
                    .with_label_values(&["dropped"])
                    .inc();
                DispatchOutcome::Dropped
            }
        }
    }

    pub fn active_workers(&self) -> usize {
        self.workers.len()
    }

    fn spawn_worker(&self, driver_id: &str) -> mpsc::Sender<GeoPoint> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let worker = Worker {
            driver_id: driver_id.to_string(),
            me: tx.clone(),
            workers: self.workers.clone(),
            handler: self.handler.clone(),
            idle_timeout: self.idle_timeout,
            metrics: self.metrics.clone(),
        };
        tokio::spawn(worker.run(rx));
        debug!(driver_id, "driver worker started");
        tx
    }
}

struct Worker {
    driver_id: DriverId,
    me: mpsc::Sender<GeoPoint>,
    workers: Arc<DashMap<DriverId, mpsc::Sender<GeoPoint>>>,
    handler: Arc<dyn DriverJobHandler>,
    idle_timeout: Duration,
    metrics: Metrics,
}

impl Worker {
    async fn run(self, mut rx: mpsc::Receiver<GeoPoint>) {
        loop {
            match tokio::time::timeout(self.idle_timeout, rx.recv()).await {
                Ok(Some(point)) => self.run_job(point).await,
                Ok(None) => break,
                Err(_elapsed) => {
                    if self.try_retire(&rx) {
                        break;
                    }
                    if !self.is_registered() {
                        while let Ok(point) = rx.try_recv() {
                            self.run_job(point).await;
                        }
                        break;
                    }
                }
            }
        }

        debug!(driver_id = %self.driver_id, "driver worker retired");
    }

    /// Unregisters only while the channel is empty. The emptiness check runs
    /// under the same entry lock `dispatch` sends under, so no job can land in
    /// a channel after its worker stopped reading it.
    fn try_retire(&self, rx: &mpsc::Receiver<GeoPoint>) -> bool {
        self.workers
            .remove_if(&self.driver_id, |_, tx| tx.same_channel(&self.me) && rx.is_empty())
            .is_some()
    }

    fn is_registered(&self) -> bool {
        self.workers
            .get(&self.driver_id)
            .is_some_and(|tx| tx.same_channel(&self.me))
    }

    async fn run_job(&self, point: GeoPoint) {
        let start = Instant::now();
        let outcome = match self.handler.handle(&self.driver_id, point).await {
            Ok(()) => "success",
            Err(err) => {
                error!(driver_id = %self.driver_id, error = %err, "background job failed");
                "error"
            }
        };

        self.metrics
            .background_job_latency_seconds
            .with_label_values(&[outcome])
            .observe(start.elapsed().as_secs_f64());
        self.metrics
            .background_jobs_total
            .with_label_values(&[outcome])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::sync::Notify;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, f64)>>,
    }

    #[async_trait]
    impl DriverJobHandler for Recorder {
        async fn handle(&self, driver_id: &str, point: GeoPoint) -> Result<(), AppError> {
            tokio::time::sleep(Duration::from_millis(1)).await;
            self.seen
                .lock()
                .unwrap()
                .push((driver_id.to_string(), point.lat));
            Ok(())
        }
    }

    async fn wait_for(recorder: &Recorder, count: usize) {
        for _ in 0..200 {
            if recorder.seen.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {count} jobs");
    }

    #[tokio::test]
    async fn jobs_for_one_driver_run_in_order() {
        let recorder = Arc::new(Recorder::default());
        let queue = DriverQueue::new(
            recorder.clone(),
            64,
            Duration::from_secs(5),
            Metrics::new(),
        );

        for i in 0..20 {
            assert_eq!(
                queue.dispatch("d1", GeoPoint::new(i as f64, 0.0)),
                DispatchOutcome::Queued
            );
        }
        wait_for(&recorder, 20).await;

        let lats: Vec<f64> = recorder
            .seen
            .lock()
            .unwrap()
            .iter()
            .map(|(_, lat)| *lat)
            .collect();
        let expected: Vec<f64> = (0..20).map(|i| i as f64).collect();
        assert_eq!(lats, expected);
    }

    struct Blocked {
        gate: Notify,
    }

    #[async_trait]
    impl DriverJobHandler for Blocked {
        async fn handle(&self, _driver_id: &str, _point: GeoPoint) -> Result<(), AppError> {
            self.gate.notified().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let handler = Arc::new(Blocked {
            gate: Notify::new(),
        });
        let queue = DriverQueue::new(handler, 1, Duration::from_secs(5), Metrics::new());

        let outcomes: Vec<DispatchOutcome> = (0..5)
            .map(|_| queue.dispatch("d1", GeoPoint::new(1.0, 1.0)))
            .collect();

        assert_eq!(outcomes[0], DispatchOutcome::Queued);
        assert!(outcomes.contains(&DispatchOutcome::Dropped));
    }

    #[tokio::test]
    async fn worker_with_pending_jobs_does_not_retire() {
        let workers = Arc::new(DashMap::new());
        let (tx, mut rx) = mpsc::channel(4);
        workers.insert("d1".to_string(), tx.clone());
        let worker = Worker {
            driver_id: "d1".to_string(),
            me: tx.clone(),
            workers: workers.clone(),
            handler: Arc::new(Recorder::default()),
            idle_timeout: Duration::from_millis(10),
            metrics: Metrics::new(),
        };

        tx.try_send(GeoPoint::new(1.0, 0.0)).unwrap();
        assert!(!worker.try_retire(&rx));
        assert_eq!(workers.len(), 1);

        rx.try_recv().unwrap();
        assert!(worker.try_retire(&rx));
        assert!(workers.is_empty());
    }

    #[tokio::test]
    async fn idle_worker_retires_and_restarts_on_demand() {
        let recorder = Arc::new(Recorder::default());
        let queue = DriverQueue::new(
            recorder.clone(),
            8,
            Duration::from_millis(100),
            Metrics::new(),
        );

        queue.dispatch("d1", GeoPoint::new(1.0, 0.0));
        wait_for(&recorder, 1).await;
        assert_eq!(queue.active_workers(), 1);

        for _ in 0..300 {
            if queue.active_workers() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(queue.active_workers(), 0);

        queue.dispatch("d1", GeoPoint::new(2.0, 0.0));
        wait_for(&recorder, 2).await;
    }
}
