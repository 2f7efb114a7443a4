//! Counters describing what a decoder has been doing

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Health metrics for one decoder
///
/// Shared between the producer thread and consumers. All fields use relaxed
/// atomics; readers get a consistent-enough view for monitoring.
#[derive(Debug)]
pub struct DecoderHealth {
    /// Units decoded and handed to the buffer
    pub units_decoded: AtomicU64,

    /// Errors swallowed while the codec was warming up
    pub startup_errors_ignored: AtomicU64,

    /// Packets the codec refused or that were dropped after a failed resubmit
    pub packets_rejected: AtomicU64,

    /// Times the producer found the buffer full and waited
    pub producer_waits: AtomicU64,

    /// Errors that ended the producer thread
    pub terminal_errors: AtomicU64,

    /// Units recycled from an evicted slot instead of freshly allocated
    pub slots_reused: AtomicU64,

    /// End-of-stream flushes sent to the codec
    pub flushes: AtomicU64,

    /// Timestamp (Unix microseconds) of the last decoded unit
    pub last_unit_time: AtomicU64,
}

impl DecoderHealth {
    pub fn new() -> Self {
        Self {
            units_decoded: AtomicU64::new(0),
            startup_errors_ignored: AtomicU64::new(0),
            packets_rejected: AtomicU64::new(0),
            producer_waits: AtomicU64::new(0),
            terminal_errors: AtomicU64::new(0),
            slots_reused: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            last_unit_time: AtomicU64::new(now_micros()),
        }
    }

    pub fn record_unit(&self) {
        self.last_unit_time.store(now_micros(), Ordering::Relaxed);
        self.units_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_startup_error(&self) {
        self.startup_errors_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_packet(&self) {
        self.packets_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_producer_wait(&self) {
        self.producer_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_terminal_error(&self) {
        self.terminal_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_slot_reuse(&self) {
        self.slots_reused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn units_decoded(&self) -> u64 {
        self.units_decoded.load(Ordering::Relaxed)
    }

    pub fn startup_errors_ignored(&self) -> u64 {
        self.startup_errors_ignored.load(Ordering::Relaxed)
    }

    pub fn packets_rejected(&self) -> u64 {
        self.packets_rejected.load(Ordering::Relaxed)
    }

    pub fn producer_waits(&self) -> u64 {
        self.producer_waits.load(Ordering::Relaxed)
    }

    pub fn terminal_errors(&self) -> u64 {
        self.terminal_errors.load(Ordering::Relaxed)
    }

    pub fn slots_reused(&self) -> u64 {
        self.slots_reused.load(Ordering::Relaxed)
    }

    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Check if no unit was decoded for longer than `threshold`
    pub fn is_stalled(&self, threshold: Duration) -> bool {
        let last = self.last_unit_time.load(Ordering::Relaxed);
        now_micros().saturating_sub(last) > threshold.as_micros() as u64
    }

    pub fn summary(&self) -> HealthSummary {
        HealthSummary {
            units_decoded: self.units_decoded(),
            startup_errors_ignored: self.startup_errors_ignored(),
            packets_rejected: self.packets_rejected(),
            producer_waits: self.producer_waits(),
            terminal_errors: self.terminal_errors(),
            slots_reused: self.slots_reused(),
            flushes: self.flushes(),
        }
    }
}

impl Default for DecoderHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of health metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSummary {
    pub units_decoded: u64,
    pub startup_errors_ignored: u64,
    pub packets_rejected: u64,
    pub producer_waits: u64,
    pub terminal_errors: u64,
    pub slots_reused: u64,
    pub flushes: u64,
}

impl std::fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Health: {} units ({} reused slots), {} producer waits, {} rejected packets, {} startup errors ignored, {} flushes, {} terminal errors",
            self.units_decoded,
            self.slots_reused,
            self.producer_waits,
            self.packets_rejected,
            self.startup_errors_ignored,
            self.flushes,
            self.terminal_errors
        )
    }
}
