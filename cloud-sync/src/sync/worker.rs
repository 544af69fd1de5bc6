//! SyncWorker — periodic sweep over every enabled account
//!
//! Sweeps start immediately and then every `interval`. A sweep that
//! overruns the interval delays the next tick instead of stacking up.

use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::SyncOrchestrator;

pub struct SyncWorker {
    orchestrator: SyncOrchestrator,
    interval: Duration,
    shutdown: CancellationToken,
}

impl SyncWorker {
    pub fn new(orchestrator: SyncOrchestrator, interval: Duration, shutdown: CancellationToken) -> Self {
        Self {
            orchestrator,
            interval,
            shutdown,
        }
    }

    pub async fn run(self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Sync worker started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Sync worker shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.orchestrator.run_sweep(&self.shutdown).await {
                        Ok(report) if report.failed > 0 => {
                            tracing::warn!(failed = report.failed, synced = report.synced, "Sweep finished with failures");
                        }
                        Ok(_) => {}
                        Err(e) if self.shutdown.is_cancelled() => {
                            tracing::debug!(error = %e, "Sweep interrupted by shutdown");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Sweep failed");
                        }
                    }
                }
            }
        }
    }
}
