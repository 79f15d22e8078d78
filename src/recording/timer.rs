//! One-second elapsed counter for an active recording

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::resources::{ResourceGuard, ResourceKind, ResourceLedger};

pub struct DurationTimer {
    elapsed: Arc<AtomicU64>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    guard: Option<ResourceGuard>,
}

impl DurationTimer {
    /// Increment `elapsed` once per second, first tick one second from now
    pub fn start(elapsed: Arc<AtomicU64>, ledger: &ResourceLedger) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let counter = Arc::clone(&elapsed);
        let period = Duration::from_secs(1);
        let mut ticker = interval_at(Instant::now() + period, period);

        let task = tokio::spawn(async move {
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
                        debug!("Recording elapsed: {}s", now);
                    }
                }
            }
        });

        Self {
            elapsed,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
            guard: Some(ledger.acquire(ResourceKind::DurationTimer)),
        }
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed.load(Ordering::SeqCst)
    }

    /// Stop counting; the value is frozen once this returns
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = task.await {
            warn!("Duration timer ended abnormally: {}", e);
        }
        if let Some(guard) = self.guard.take() {
            guard.release();
        }
    }
}

impl Drop for DurationTimer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
