use dashmap::DashMap;
use ipnet::IpNet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::packet::Packet;

/// Downstream stage that receives every decoded packet, one at a time.
pub trait PacketInspector {
    fn inspect(&mut self, packet: &Packet);
}

impl<F> PacketInspector for F
where
    F: FnMut(&Packet),
{
    fn inspect(&mut self, packet: &Packet) {
        self(packet)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Forward,
    Drop,
}

/// Destinations tracked individually before further ones are only counted.
pub const DEFAULT_TRACKED_DESTINATIONS: usize = 4096;

#[derive(Debug, Clone, Copy)]
pub struct DestinationDrops {
    pub packets: u64,
    pub last_seen: Instant,
}

#[derive(Debug)]
pub struct FirewallStats {
    pub forwarded: AtomicU64,
    pub dropped: AtomicU64,
    /// Drops to destinations that arrived while the table was full.
    pub untracked_drops: AtomicU64,
    pub drops_by_destination: DashMap<Ipv4Addr, DestinationDrops>,
    max_tracked: usize,
}

impl Default for FirewallStats {
    fn default() -> Self {
        Self::new(DEFAULT_TRACKED_DESTINATIONS)
    }
}

impl FirewallStats {
    pub fn new(max_tracked: usize) -> Self {
        Self {
            forwarded: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            untracked_drops: AtomicU64::new(0),
            drops_by_destination: DashMap::new(),
            max_tracked,
        }
    }

    pub fn record_drop(&self, destination: Ipv4Addr) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        if let Some(mut entry) = self.drops_by_destination.get_mut(&destination) {
            entry.packets += 1;
            entry.last_seen = now;
            return;
        }
        if self.drops_by_destination.len() >= self.max_tracked {
            self.untracked_drops.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.drops_by_destination.insert(
            destination,
            DestinationDrops {
                packets: 1,
                last_seen: now,
            },
        );
    }

    /// Forget destinations with no drop in the last `timeout`.
    pub fn cleanup_stale_destinations(&self, timeout: Duration) {
        let now = Instant::now();
        let before = self.drops_by_destination.len();
        self.drops_by_destination
            .retain(|_, drops| now.duration_since(drops.last_seen) <= timeout);
        let removed = before.saturating_sub(self.drops_by_destination.len());
        if removed > 0 {
            tracing::debug!("forgot {} idle drop destinations", removed);
        }
    }
}

/// Drops packets addressed to a blacklisted network and forwards the rest.
pub struct Firewall {
    blacklist: Vec<IpNet>,
    stats: Arc<FirewallStats>,
}

impl Firewall {
    pub fn new(blacklist: Vec<IpNet>) -> Self {
        Self::with_tracking_limit(blacklist, DEFAULT_TRACKED_DESTINATIONS)
    }

    /// Like [`new`](Self::new), tracking at most `max_tracked` destinations.
    pub fn with_tracking_limit(blacklist: Vec<IpNet>, max_tracked: usize) -> Self {
        Self {
            blacklist,
            stats: Arc::new(FirewallStats::new(max_tracked)),
        }
    }

    pub fn stats(&self) -> Arc<FirewallStats> {
        self.stats.clone()
    }

    pub fn verdict(&self, packet: &Packet) -> Verdict {
        let dst = IpAddr::V4(packet.header.destination());
        if self.blacklist.iter().any(|net| net.contains(&dst)) {
            Verdict::Drop
        } else {
            Verdict::Forward
        }
    }
}

impl PacketInspector for Firewall {
    fn inspect(&mut self, packet: &Packet) {
        match self.verdict(packet) {
            Verdict::Forward => {
                self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
            }
            Verdict::Drop => {
                tracing::debug!("dropping {}", packet);
                self.stats.record_drop(packet.header.destination());
            }
        }
    }
}
