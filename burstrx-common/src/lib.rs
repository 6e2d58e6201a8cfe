#![no_std]

//! Layout of the batch region shared between the poller and whatever fills
//! it (a driver shim or a software source).
//!
//! A region is a 16-bit packet count in host byte order, an optional gap, and
//! then an array of descriptor pairs. Each pair is two machine words: an
//! opaque buffer handle and the address of the packet's IPv4 header.

/// Width of the leading packet-count field.
pub const COUNT_FIELD_LEN: usize = core::mem::size_of::<u16>();

/// Size of the fixed IPv4 header view (no options).
pub const IPV4_HEADER_LEN: usize = 20;

/// Largest burst the receive call is asked to fill by default.
pub const DEFAULT_MAX_BURST: usize = 512;

/// Bytes needed for a region holding `max_burst` pairs of `word_size`-byte words,
/// or `None` if that does not fit in a `usize`.
pub const fn region_len(header_gap: usize, max_burst: usize, word_size: usize) -> Option<usize> {
    let pairs = match max_burst.checked_mul(word_size) {
        Some(words) => match words.checked_mul(2) {
            Some(bytes) => bytes,
            None => return None,
        },
        None => return None,
    };
    match COUNT_FIELD_LEN.checked_add(header_gap) {
        Some(head) => head.checked_add(pairs),
        None => None,
    }
}

/// One descriptor pair as written by a 64-bit driver shim.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorPair {
    /// Buffer-management handle owned by the driver. Never dereferenced here.
    pub handle: u64,
    /// Address of the packet's IPv4 header.
    pub header_addr: u64,
}

/// IPv4 header as it sits in packet memory. Multi-byte fields are in network
/// byte order.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Ipv4HeaderRaw {
    pub version_ihl: u8,
    pub type_of_service: u8,
    pub total_length: [u8; 2],
    pub packet_id: [u8; 2],
    pub fragment_offset: [u8; 2],
    pub time_to_live: u8,
    pub next_proto_id: u8,
    pub hdr_checksum: [u8; 2],
    pub src_addr: [u8; 4],
    pub dst_addr: [u8; 4],
}

// 1+1+2+2+2+1+1+2+4+4, no padding since every field is byte-aligned.
const _: () = assert!(core::mem::size_of::<Ipv4HeaderRaw>() == IPV4_HEADER_LEN);
const _: () = assert!(core::mem::size_of::<DescriptorPair>() == 16);

impl Ipv4HeaderRaw {
    /// Serialize in wire order.
    pub fn to_bytes(&self) -> [u8; IPV4_HEADER_LEN] {
        let mut out = [0u8; IPV4_HEADER_LEN];
        out[0] = self.version_ihl;
        out[1] = self.type_of_service;
        out[2..4].copy_from_slice(&self.total_length);
        out[4..6].copy_from_slice(&self.packet_id);
        out[6..8].copy_from_slice(&self.fragment_offset);
        out[8] = self.time_to_live;
        out[9] = self.next_proto_id;
        out[10..12].copy_from_slice(&self.hdr_checksum);
        out[12..16].copy_from_slice(&self.src_addr);
        out[16..20].copy_from_slice(&self.dst_addr);
        out
    }
}
