//! Capture worker instrumentation

use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters updated by the capture worker
#[derive(Debug, Default)]
pub struct CaptureStats {
    received: AtomicUsize,
    written: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Point-in-time copy of [`CaptureStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureSnapshot {
    /// Exchanges taken out of the mailbox
    pub received: usize,
    /// Artifacts written and closed
    pub written: usize,
    /// Exchanges with no writer for their content type
    pub skipped: usize,
    /// Artifacts dropped because writing or closing failed
    pub failed: usize,
    /// Artifacts currently being written
    pub in_flight: usize,
    /// Highest `in_flight` ever observed
    pub max_in_flight: usize,
}

impl CaptureStats {
    /// Create zeroed counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn begin_write(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_in_flight.fetch_max(now, Ordering::AcqRel);
    }

    pub(crate) fn end_write(&self, succeeded: bool) {
        if succeeded {
            self.written.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    /// Read all counters
    #[must_use]
    pub fn snapshot(&self) -> CaptureSnapshot {
        CaptureSnapshot {
            received: self.received.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Acquire),
            max_in_flight: self.max_in_flight.load(Ordering::Acquire),
        }
    }
}
