use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters written by the poller and read by reporters.
///
/// Only the poller that owns this value increments it; everyone else holds an
/// `Arc` and loads.
#[derive(Debug, Default)]
pub struct PollerStats {
    pub total_packets: AtomicU64,
    /// Sum of IPv4 total-length fields of decoded packets.
    pub total_bytes: AtomicU64,
    /// Non-empty batches.
    pub batches: AtomicU64,
    pub idle_polls: AtomicU64,
    pub malformed_batches: AtomicU64,
    pub invalid_packets: AtomicU64,
    pub receive_retries: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub total_packets: u64,
    pub total_bytes: u64,
    pub batches: u64,
    pub idle_polls: u64,
    pub malformed_batches: u64,
    pub invalid_packets: u64,
    pub receive_retries: u64,
}

impl PollerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_packets: self.total_packets.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            idle_polls: self.idle_polls.load(Ordering::Relaxed),
            malformed_batches: self.malformed_batches.load(Ordering::Relaxed),
            invalid_packets: self.invalid_packets.load(Ordering::Relaxed),
            receive_retries: self.receive_retries.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Change since `earlier`.
    pub fn since(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            total_packets: self.total_packets.saturating_sub(earlier.total_packets),
            total_bytes: self.total_bytes.saturating_sub(earlier.total_bytes),
            batches: self.batches.saturating_sub(earlier.batches),
            idle_polls: self.idle_polls.saturating_sub(earlier.idle_polls),
            malformed_batches: self.malformed_batches.saturating_sub(earlier.malformed_batches),
            invalid_packets: self.invalid_packets.saturating_sub(earlier.invalid_packets),
            receive_retries: self.receive_retries.saturating_sub(earlier.receive_retries),
        }
    }
}
