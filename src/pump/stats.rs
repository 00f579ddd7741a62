//! Pump observability: counters and termination reasons.
//!
//! Stats are written by the pump loops and read by whoever holds the
//! [`PumpHandle`](crate::pump::PumpHandle) — logging, metrics, tests. The
//! pump itself never consumes them.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::PumpError;

/// Per-connection pump counters.
///
/// Shared between the pump loops and external observers; all counters are
/// monotonic.
#[derive(Debug, Default)]
pub struct PumpStats {
    received: AtomicU64,
    dropped: AtomicU64,
    processed: AtomicU64,
    sent: AtomicU64,
}

impl PumpStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames received from the transport.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Frames lost to the channel's overflow policy.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Frames that completed the processing stage.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Messages written to the wire.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received(),
            dropped: self.dropped(),
            processed: self.processed(),
            sent: self.sent(),
        }
    }
}

/// Point-in-time view of [`PumpStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub dropped: u64,
    pub processed: u64,
    pub sent: u64,
}

/// Why a pump stopped.
#[derive(Debug)]
pub enum Termination {
    /// The peer closed the connection (or a send found it closed). The
    /// expected way for a pump to end.
    Disconnect,

    /// The pump was cancelled from the outside (handle dropped, session
    /// manager shutdown).
    Shutdown,

    /// An operation failed with something other than a disconnect. Reported
    /// upward; never affects sibling connections.
    Failed(PumpError),
}

impl Termination {
    /// Whether this is a benign close rather than a pump failure.
    pub fn is_clean(&self) -> bool {
        !matches!(self, Termination::Failed(_))
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Disconnect => write!(f, "disconnect"),
            Termination::Shutdown => write!(f, "shutdown"),
            Termination::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_independent() {
        let stats = PumpStats::new();
        stats.record_received();
        stats.record_received();
        stats.record_dropped();
        stats.record_processed();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.received, 2);
        assert_eq!(snapshot.dropped, 1);
        assert_eq!(snapshot.processed, 1);
        assert_eq!(snapshot.sent, 0);
    }

    #[test]
    fn termination_classification() {
        assert!(Termination::Disconnect.is_clean());
        assert!(Termination::Shutdown.is_clean());
        assert!(!Termination::Failed(PumpError::predictor_failed("boom")).is_clean());
    }
}
