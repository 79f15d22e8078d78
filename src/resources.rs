//! Accounting for the long-running resources a recording owns
//!
//! Each mix graph, redraw loop, capture engine and duration timer holds a
//! `ResourceGuard` for as long as it runs. The ledger can then report how
//! many of each are active, which is how "exactly one while recording,
//! zero after stop" is observed.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    MixGraph,
    RedrawLoop,
    CaptureEngine,
    DurationTimer,
}

#[derive(Debug, Default)]
struct Counts {
    mix_graphs: AtomicUsize,
    redraw_loops: AtomicUsize,
    capture_engines: AtomicUsize,
    duration_timers: AtomicUsize,
    teardowns: AtomicUsize,
}

impl Counts {
    fn slot(&self, kind: ResourceKind) -> &AtomicUsize {
        match kind {
            ResourceKind::MixGraph => &self.mix_graphs,
            ResourceKind::RedrawLoop => &self.redraw_loops,
            ResourceKind::CaptureEngine => &self.capture_engines,
            ResourceKind::DurationTimer => &self.duration_timers,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResourceLedger {
    counts: Arc<Counts>,
}

/// Point-in-time view of the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceSnapshot {
    pub mix_graphs: usize,
    pub redraw_loops: usize,
    pub capture_engines: usize,
    pub duration_timers: usize,
    pub teardowns: usize,
}

impl ResourceSnapshot {
    pub fn is_idle(&self) -> bool {
        self.mix_graphs == 0
            && self.redraw_loops == 0
            && self.capture_engines == 0
            && self.duration_timers == 0
    }
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an active resource; it stays counted until the guard is released or dropped
    pub fn acquire(&self, kind: ResourceKind) -> ResourceGuard {
        let now = self.counts.slot(kind).fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Resource acquired: {:?} (active: {})", kind, now);
        ResourceGuard {
            ledger: self.clone(),
            kind,
            released: false,
        }
    }

    pub fn active(&self, kind: ResourceKind) -> usize {
        self.counts.slot(kind).load(Ordering::SeqCst)
    }

    pub(crate) fn record_teardown(&self) {
        self.counts.teardowns.fetch_add(1, Ordering::SeqCst);
    }

    /// Completed teardown sequences
    pub fn teardowns(&self) -> usize {
        self.counts.teardowns.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            mix_graphs: self.active(ResourceKind::MixGraph),
            redraw_loops: self.active(ResourceKind::RedrawLoop),
            capture_engines: self.active(ResourceKind::CaptureEngine),
            duration_timers: self.active(ResourceKind::DurationTimer),
            teardowns: self.teardowns(),
        }
    }
}

#[derive(Debug)]
pub struct ResourceGuard {
    ledger: ResourceLedger,
    kind: ResourceKind,
    released: bool,
}

impl ResourceGuard {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let now = self.ledger.counts.slot(self.kind).fetch_sub(1, Ordering::SeqCst) - 1;
        debug!("Resource released: {:?} (active: {})", self.kind, now);
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_counts_until_released() {
        let ledger = ResourceLedger::new();
        let guard = ledger.acquire(ResourceKind::MixGraph);
        assert_eq!(ledger.active(ResourceKind::MixGraph), 1);
        assert_eq!(ledger.active(ResourceKind::RedrawLoop), 0);

        guard.release();
        assert_eq!(ledger.active(ResourceKind::MixGraph), 0);
        assert!(ledger.snapshot().is_idle());
    }

    #[test]
    fn test_dropped_guard_is_released_once() {
        let ledger = ResourceLedger::new();
        {
            let _a = ledger.acquire(ResourceKind::DurationTimer);
            let _b = ledger.acquire(ResourceKind::DurationTimer);
            assert_eq!(ledger.active(ResourceKind::DurationTimer), 2);
        }
        assert_eq!(ledger.active(ResourceKind::DurationTimer), 0);
    }

    #[test]
    fn test_clones_share_counts() {
        let ledger = ResourceLedger::new();
        let other = ledger.clone();
        let _guard = other.acquire(ResourceKind::CaptureEngine);
        ledger.record_teardown();

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.capture_engines, 1);
        assert_eq!(snapshot.teardowns, 1);
    }
}
