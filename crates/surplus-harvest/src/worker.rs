//! Periodic connector worker.
//!
//! Runs one cycle immediately, then one per poll interval. A cycle that is
//! still in flight when the next tick fires makes the tick a no-op: the
//! guard keeps at most one cycle running, since the retry context map must
//! never be shared across concurrent cycles. Cycle failures are logged and
//! the worker keeps going; the next tick schedules a fresh cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::MissedTickBehavior;

use crate::config::{RetryConfig, WorkerConfig};
use crate::orchestrator::Orchestrator;

pub async fn run_worker(
    orchestrator: Arc<Orchestrator>,
    worker: WorkerConfig,
    retry: RetryConfig,
) -> Result<()> {
    let running = Arc::new(AtomicBool::new(false));
    let mut ticker = tokio::time::interval(Duration::from_secs(worker.poll_interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        poll_interval_secs = worker.poll_interval_secs,
        max_attempts = retry.max_attempts,
        "connector worker started"
    );

    loop {
        ticker.tick().await;

        if running.swap(true, Ordering::SeqCst) {
            tracing::warn!("previous cycle still in flight; skipping tick");
            continue;
        }

        let orchestrator = orchestrator.clone();
        let running = running.clone();
        tokio::spawn(async move {
            match orchestrator.run_all_connectors_with_backoff(retry).await {
                Ok(outcomes) => {
                    let created: u64 = outcomes.iter().map(|o| o.created).sum();
                    tracing::info!(
                        connectors = outcomes.len(),
                        created,
                        "connector cycle complete"
                    );
                }
                Err(error) => {
                    tracing::error!(%error, "connector cycle failed");
                }
            }
            running.store(false, Ordering::SeqCst);
        });
    }
}
