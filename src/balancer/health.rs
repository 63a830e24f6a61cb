//! Periodic health monitoring of the backend pool.

use super::backend::Health;
use super::config::HealthCheckConfig;
use super::pool::BackendPool;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Recurring task that probes every backend and reclassifies it.
///
/// One cycle probes the healthy partition first, then the unhealthy one,
/// sequentially. The pool lock is taken only to snapshot membership and to
/// apply each reclassification, never across probe I/O. A single task runs
/// the cycles, so at most one cycle is in flight per pool.
#[derive(Debug)]
pub struct HealthMonitor {
    pool: Arc<BackendPool>,
    config: HealthCheckConfig,
}

impl HealthMonitor {
    /// Create a monitor for the given pool.
    #[must_use]
    pub fn new(pool: Arc<BackendPool>, config: HealthCheckConfig) -> Self {
        Self { pool, config }
    }

    /// Spawn the recurring task. The first cycle runs immediately.
    #[must_use]
    pub fn start(self) -> MonitorHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(self.run(shutdown_rx));
        MonitorHandle { shutdown_tx, task }
    }

    async fn run(self, mut shutdown: mpsc::Receiver<()>) {
        debug!(
            interval_secs = self.config.interval.as_secs(),
            "Health monitor started"
        );

        loop {
            self.cycle().await;

            tokio::select! {
                _ = shutdown.recv() => {
                    debug!("Health monitor shutting down");
                    break;
                }
                () = tokio::time::sleep(self.config.interval) => {}
            }
        }
    }

    /// Run one probe pass over every backend.
    ///
    /// Probe failures are confined to the cycle; a slow backend delays it by
    /// at most the probe timeout.
    pub async fn cycle(&self) {
        let start = Instant::now();
        let (healthy, unhealthy) = self.pool.partition_snapshot();
        debug!(
            healthy = healthy.len(),
            unhealthy = unhealthy.len(),
            "Probing backends"
        );

        for slot in healthy {
            self.probe_and_reclassify(slot).await;
        }
        for slot in unhealthy {
            self.probe_and_reclassify(slot).await;
        }

        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            healthy = self.pool.healthy_count(),
            total = self.pool.backend_count(),
            "Health check cycle complete"
        );
    }

    async fn probe_and_reclassify(&self, slot: usize) {
        let backend = self.pool.backend(slot);
        match backend.probe(&self.config.path, self.config.timeout).await {
            Ok(()) => self.pool.reclassify(slot, Health::Healthy),
            Err(e) => {
                warn!(backend = %backend.address(), error = %e, "Health probe failed");
                self.pool.reclassify(slot, Health::Unhealthy);
            },
        }
    }
}

/// Handle to a running monitor task.
#[derive(Debug)]
pub struct MonitorHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Stop the monitor cooperatively and wait for it to exit.
    ///
    /// An in-flight probe is allowed to finish; the task exits before its
    /// next sleep.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "Health monitor task ended abnormally");
        }
    }
}
