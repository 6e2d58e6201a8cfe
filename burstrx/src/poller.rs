use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cursor::MemoryCursor;
use crate::error::{BatchError, PollError, ReceiveError};
use crate::inspect::PacketInspector;
use crate::packet::{Packet, PacketDescriptor};
use crate::receiver::BurstReceiver;
use crate::region::{BatchLayout, BatchRegion};
use crate::stats::PollerStats;

/// What a single poll iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The receive call reported no packets.
    Idle,
    /// `decoded` packets went to the inspector; `skipped` had unusable headers.
    Batch { decoded: usize, skipped: usize },
    /// Transient receive failure; nothing was read.
    Retry,
    /// The batch header disagreed with the region and the batch was dropped.
    Malformed,
}

/// Drives the burst-receive loop: receive, decode, inspect, repeat.
pub struct ReceivePoller<R, I> {
    receiver: R,
    inspector: I,
    region: BatchRegion,
    total_packets: u64,
    stats: Arc<PollerStats>,
    retry_delay: Duration,
}

impl<R, I> ReceivePoller<R, I>
where
    R: BurstReceiver,
    I: PacketInspector,
{
    /// Allocates the batch region once; it is reused for every iteration.
    pub fn new(receiver: R, inspector: I, layout: BatchLayout) -> Result<Self, PollError> {
        Ok(Self {
            receiver,
            inspector,
            region: BatchRegion::allocate(layout)?,
            total_packets: 0,
            stats: Arc::new(PollerStats::new()),
            retry_delay: Duration::from_millis(1),
        })
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Packets reported by every batch accepted so far.
    pub fn total_packets(&self) -> u64 {
        self.total_packets
    }

    pub fn stats(&self) -> Arc<PollerStats> {
        self.stats.clone()
    }

    pub fn layout(&self) -> &BatchLayout {
        self.region.layout()
    }

    pub fn receiver(&self) -> &R {
        &self.receiver
    }

    pub fn receiver_mut(&mut self) -> &mut R {
        &mut self.receiver
    }

    pub fn inspector(&self) -> &I {
        &self.inspector
    }

    /// Polls until `running` is cleared. The flag is checked once per
    /// iteration, so shutdown waits for the batch in flight.
    pub fn run(&mut self, running: &AtomicBool) -> Result<(), PollError> {
        tracing::info!(
            "poller started (max burst {}, {}-byte words)",
            self.region.layout().max_burst,
            self.region.layout().word_size.bytes()
        );
        while running.load(Ordering::Relaxed) {
            if self.poll_once()? == PollOutcome::Retry {
                std::thread::sleep(self.retry_delay);
            }
        }
        tracing::info!("poller stopped after {} packets", self.total_packets);
        Ok(())
    }

    /// One receive-decode-inspect iteration.
    pub fn poll_once(&mut self) -> Result<PollOutcome, PollError> {
        self.region.reset();
        match self.receiver.receive_burst(&mut self.region) {
            Ok(()) => {}
            Err(ReceiveError::Transient(reason)) => {
                tracing::warn!("receive unavailable, retrying: {}", reason);
                self.stats.receive_retries.fetch_add(1, Ordering::Relaxed);
                return Ok(PollOutcome::Retry);
            }
            Err(e) => return Err(e.into()),
        }

        let layout = *self.region.layout();
        let mut cursor = self.region.cursor();
        let (count, descriptors_at) = match read_batch_header(&mut cursor, &layout) {
            Ok(header) => header,
            Err(e) => {
                tracing::warn!("skipping malformed batch: {}", e);
                self.stats.malformed_batches.fetch_add(1, Ordering::Relaxed);
                return Ok(PollOutcome::Malformed);
            }
        };

        self.total_packets += count as u64;
        self.stats
            .total_packets
            .fetch_add(count as u64, Ordering::Relaxed);

        if count == 0 {
            self.stats.idle_polls.fetch_add(1, Ordering::Relaxed);
            return Ok(PollOutcome::Idle);
        }

        let memory = self.receiver.memory();
        let stride = layout.pair_stride() as u64;
        let mut decoded = 0;
        let mut skipped = 0;

        for index in 0..count {
            cursor.seek(descriptors_at + index as u64 * stride);
            let packet = PacketDescriptor::read(&mut cursor)
                .and_then(|desc| Packet::decode(index, desc, memory, layout.word_size));
            match packet {
                Ok(packet) => {
                    self.stats
                        .total_bytes
                        .fetch_add(u64::from(packet.header.total_length), Ordering::Relaxed);
                    self.inspector.inspect(&packet);
                    decoded += 1;
                }
                Err(e) => {
                    tracing::warn!("skipping packet {} of {}: {}", index, count, e);
                    self.stats.invalid_packets.fetch_add(1, Ordering::Relaxed);
                    skipped += 1;
                }
            }
        }

        tracing::info!("decoded {} packets", decoded);
        self.stats.batches.fetch_add(1, Ordering::Relaxed);
        Ok(PollOutcome::Batch { decoded, skipped })
    }
}

/// Reads the packet count and returns it with the address of the first
/// descriptor pair.
fn read_batch_header(
    cursor: &mut MemoryCursor<'_>,
    layout: &BatchLayout,
) -> Result<(usize, u64), BatchError> {
    cursor.seek(0);
    let count = usize::from(cursor.read_u16()?);
    if count > layout.max_burst {
        return Err(BatchError::CountExceedsBurst {
            count,
            max_burst: layout.max_burst,
        });
    }
    let descriptors_at = (cursor.consumed_since_last_seek() + layout.header_gap) as u64;
    Ok((count, descriptors_at))
}
