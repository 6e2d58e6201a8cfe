//! Burst-receive packet ingestion.
//!
//! A [`ReceivePoller`](poller::ReceivePoller) repeatedly hands a reusable
//! batch region to a [`BurstReceiver`](receiver::BurstReceiver), decodes the
//! descriptor pairs and IPv4 headers the receiver left behind, and passes
//! each packet to a [`PacketInspector`](inspect::PacketInspector).

pub mod api;
pub mod config;
pub mod cursor;
pub mod error;
pub mod inspect;
pub mod memory;
pub mod packet;
pub mod poller;
pub mod receiver;
pub mod region;
pub mod stats;

pub use cursor::{MemoryCursor, WordSize};
pub use error::{BatchError, ConfigError, DecodeError, PollError, ReceiveError};
pub use inspect::{Firewall, PacketInspector, Verdict};
pub use memory::{PacketMemory, SegmentMemory};
pub use packet::{Ipv4Header, Packet, PacketDescriptor};
pub use poller::{PollOutcome, ReceivePoller};
pub use receiver::{BurstReceiver, ScriptedReceiver, SyntheticReceiver};
pub use region::{BatchLayout, BatchRegion};
pub use stats::{PollerStats, StatsSnapshot};
