use std::collections::VecDeque;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use burstrx_common::{DescriptorPair, IPV4_HEADER_LEN};

use crate::config::SyntheticConfig;
use crate::error::ReceiveError;
use crate::memory::{PacketMemory, SegmentMemory};
use crate::packet::Ipv4Header;
use crate::region::BatchRegion;

/// Link-layer header in front of each IPv4 header in packet memory.
const ETHER_HDR_LEN: usize = 14;

/// Spacing between packet buffers handed out by the software sources.
const BUFFER_STRIDE: u64 = 2048;

/// First buffer address. Below 4 GiB so it also fits 4-byte words.
const BUFFER_BASE: u64 = 0x1000_0000;

/// Burst receive contract.
///
/// `receive_burst` is handed a zeroed region and must leave a packet count and
/// that many descriptor pairs in it. Header addresses in those pairs point
/// into [`memory`](Self::memory).
pub trait BurstReceiver {
    type Memory: PacketMemory;

    fn receive_burst(&mut self, region: &mut BatchRegion) -> Result<(), ReceiveError>;

    fn memory(&self) -> &Self::Memory;
}

/// One scripted receive call.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Well-formed batch; headers were mapped when the step was queued.
    Batch(Vec<DescriptorPair>),
    /// Count and pairs written as given, even if they disagree.
    Raw { count: u16, pairs: Vec<DescriptorPair> },
    Fail(ReceiveError),
}

/// Replays queued batches, then reports idle polls forever.
#[derive(Debug, Default)]
pub struct ScriptedReceiver {
    steps: VecDeque<ScriptStep>,
    memory: SegmentMemory,
    next_buffer: u64,
    calls: u64,
}

impl ScriptedReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps each header into its own buffer and queues a batch pointing at
    /// them. Returns the header addresses in batch order.
    pub fn push_headers(&mut self, headers: &[Ipv4Header]) -> Vec<u64> {
        let pairs: Vec<DescriptorPair> = headers.iter().map(|h| self.map_header(h)).collect();
        let addrs = pairs.iter().map(|p| p.header_addr).collect();
        self.steps.push_back(ScriptStep::Batch(pairs));
        addrs
    }

    pub fn push_raw(&mut self, count: u16, pairs: Vec<DescriptorPair>) {
        self.steps.push_back(ScriptStep::Raw { count, pairs });
    }

    pub fn push_failure(&mut self, err: ReceiveError) {
        self.steps.push_back(ScriptStep::Fail(err));
    }

    /// Maps arbitrary bytes into packet memory.
    pub fn map(&mut self, base: u64, bytes: Vec<u8>) {
        self.memory.insert(base, bytes);
    }

    /// Maps a header and returns a descriptor pair pointing at it, without
    /// queueing anything.
    pub fn map_header(&mut self, header: &Ipv4Header) -> DescriptorPair {
        let base = BUFFER_BASE + self.next_buffer * BUFFER_STRIDE;
        let mut buf = vec![0u8; ETHER_HDR_LEN];
        buf.extend_from_slice(&header.to_raw().to_bytes());
        self.memory.insert(base, buf);
        self.next_buffer += 1;
        DescriptorPair {
            handle: self.next_buffer,
            header_addr: base + ETHER_HDR_LEN as u64,
        }
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl BurstReceiver for ScriptedReceiver {
    type Memory = SegmentMemory;

    fn receive_burst(&mut self, region: &mut BatchRegion) -> Result<(), ReceiveError> {
        self.calls += 1;
        let (count, pairs) = match self.steps.pop_front() {
            None => return Ok(()),
            Some(ScriptStep::Fail(err)) => return Err(err),
            Some(ScriptStep::Batch(pairs)) => {
                let count = u16::try_from(pairs.len()).map_err(|_| {
                    ReceiveError::Fatal(format!(
                        "scripted batch of {} packets exceeds the count field",
                        pairs.len()
                    ))
                })?;
                (count, pairs)
            }
            Some(ScriptStep::Raw { count, pairs }) => (count, pairs),
        };
        region.write_count(count);
        for (i, pair) in pairs.into_iter().enumerate() {
            region
                .write_pair(i, pair)
                .map_err(|e| ReceiveError::Fatal(e.to_string()))?;
        }
        Ok(())
    }

    fn memory(&self) -> &SegmentMemory {
        &self.memory
    }
}

/// Software burst source producing random traffic toward 10.0.0.0/24.
///
/// Packet memory is recycled on every call, so headers from the previous
/// burst are gone once the next one is requested.
pub struct SyntheticReceiver {
    config: SyntheticConfig,
    rng: StdRng,
    memory: SegmentMemory,
    calls: u64,
    next_id: u16,
}

impl SyntheticReceiver {
    pub fn new(config: SyntheticConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng,
            memory: SegmentMemory::new(),
            calls: 0,
            next_id: 0,
        }
    }

    fn random_header(&mut self) -> Ipv4Header {
        let proto = [6u8, 17, 1][self.rng.gen_range(0..3)];
        // Occasionally aim at the null network so a default firewall has
        // something to drop.
        let dst = if self.rng.gen_ratio(1, 64) {
            u32::from_be_bytes([0, 0, 0, 1])
        } else {
            u32::from_be_bytes([10, 0, 0, self.rng.gen()])
        };
        let mut header = Ipv4Header {
            version_ihl: 0x45,
            dscp_ecn: 0,
            total_length: self.rng.gen_range(IPV4_HEADER_LEN as u16 + 20..=1500),
            packet_id: self.next_id,
            fragment_offset: 0x4000,
            time_to_live: 64,
            next_proto_id: proto,
            hdr_checksum: 0,
            src_addr: u32::from_be_bytes([10, 0, 1, self.rng.gen()]),
            dst_addr: dst,
        };
        header.hdr_checksum = ipv4_checksum(&header.to_raw().to_bytes());
        self.next_id = self.next_id.wrapping_add(1);
        header
    }
}

impl BurstReceiver for SyntheticReceiver {
    type Memory = SegmentMemory;

    fn receive_burst(&mut self, region: &mut BatchRegion) -> Result<(), ReceiveError> {
        self.calls += 1;
        self.memory.clear();
        if self.config.interval_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.config.interval_ms));
        }

        if self.config.idle_every > 0 && self.calls % self.config.idle_every == 0 {
            return Ok(());
        }

        let limit = self
            .config
            .max_batch
            .min(region.layout().max_burst)
            .min(usize::from(u16::MAX));
        if limit == 0 {
            return Ok(());
        }
        let count = self.rng.gen_range(1..=limit);

        for i in 0..count {
            let header = self.random_header();
            let base = BUFFER_BASE + i as u64 * BUFFER_STRIDE;
            let mut buf = vec![0u8; ETHER_HDR_LEN];
            buf.extend_from_slice(&header.to_raw().to_bytes());
            self.memory.insert(base, buf);

            let pair = DescriptorPair {
                handle: i as u64 + 1,
                header_addr: base + ETHER_HDR_LEN as u64,
            };
            region
                .write_pair(i, pair)
                .map_err(|e| ReceiveError::Fatal(e.to_string()))?;
        }
        region.write_count(count as u16);
        Ok(())
    }

    fn memory(&self) -> &SegmentMemory {
        &self.memory
    }
}

/// Internet checksum over a header whose checksum field is zero.
fn ipv4_checksum(header: &[u8]) -> u16 {
    let mut sum: u32 = header
        .chunks(2)
        .map(|c| u32::from(u16::from_be_bytes([c[0], *c.get(1).unwrap_or(&0)])))
        .sum();
    while sum > 0xFFFF {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}
