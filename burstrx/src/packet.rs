use std::fmt;
use std::net::Ipv4Addr;

use burstrx_common::Ipv4HeaderRaw;

use crate::cursor::{MemoryCursor, WordSize};
use crate::error::DecodeError;
use crate::memory::PacketMemory;

/// Descriptor pair read from the batch region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketDescriptor {
    /// Buffer-management handle. Owned by the driver; never dereferenced.
    pub handle: u64,
    pub header_addr: u64,
}

impl PacketDescriptor {
    /// Reads the handle word followed by the header-address word.
    pub fn read(cursor: &mut MemoryCursor<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            handle: cursor.read_word()?,
            header_addr: cursor.read_word()?,
        })
    }
}

/// Fixed 20-byte IPv4 header, multi-byte fields converted to host order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ipv4Header {
    pub version_ihl: u8,
    pub dscp_ecn: u8,
    pub total_length: u16,
    pub packet_id: u16,
    pub fragment_offset: u16,
    pub time_to_live: u8,
    pub next_proto_id: u8,
    pub hdr_checksum: u16,
    pub src_addr: u32,
    pub dst_addr: u32,
}

impl Ipv4Header {
    /// Decodes the header at the cursor's position, in wire field order.
    pub fn decode(cursor: &mut MemoryCursor<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            version_ihl: cursor.read_u8()?,
            dscp_ecn: cursor.read_u8()?,
            total_length: cursor.read_be_u16()?,
            packet_id: cursor.read_be_u16()?,
            fragment_offset: cursor.read_be_u16()?,
            time_to_live: cursor.read_u8()?,
            next_proto_id: cursor.read_u8()?,
            hdr_checksum: cursor.read_be_u16()?,
            src_addr: cursor.read_be_u32()?,
            dst_addr: cursor.read_be_u32()?,
        })
    }

    pub fn version(&self) -> u8 {
        self.version_ihl >> 4
    }

    /// Header length in 32-bit words.
    pub fn ihl(&self) -> u8 {
        self.version_ihl & 0x0F
    }

    pub fn source(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.src_addr)
    }

    pub fn destination(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.dst_addr)
    }

    pub fn protocol_name(&self) -> String {
        match self.next_proto_id {
            1 => "ICMP".to_string(),
            6 => "TCP".to_string(),
            17 => "UDP".to_string(),
            other => format!("IP({})", other),
        }
    }

    /// Wire representation, as a driver would leave it in packet memory.
    pub fn to_raw(&self) -> Ipv4HeaderRaw {
        Ipv4HeaderRaw {
            version_ihl: self.version_ihl,
            type_of_service: self.dscp_ecn,
            total_length: self.total_length.to_be_bytes(),
            packet_id: self.packet_id.to_be_bytes(),
            fragment_offset: self.fragment_offset.to_be_bytes(),
            time_to_live: self.time_to_live,
            next_proto_id: self.next_proto_id,
            hdr_checksum: self.hdr_checksum.to_be_bytes(),
            src_addr: self.src_addr.to_be_bytes(),
            dst_addr: self.dst_addr.to_be_bytes(),
        }
    }
}

/// One decoded arrival: its descriptor and IPv4 header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub descriptor: PacketDescriptor,
    pub header: Ipv4Header,
    /// Milliseconds since the epoch at decode time.
    pub received_at: i64,
}

impl Packet {
    /// Resolves the descriptor's header address in `memory` and decodes the
    /// header there. `index` is the slot in the batch, used for error reports.
    pub fn decode<M>(
        index: usize,
        descriptor: PacketDescriptor,
        memory: &M,
        word: WordSize,
    ) -> Result<Self, DecodeError>
    where
        M: PacketMemory + ?Sized,
    {
        let addr = descriptor.header_addr;
        if addr == 0 {
            return Err(DecodeError::NullHeader { index });
        }
        let (base, segment) = memory
            .segment(addr)
            .ok_or(DecodeError::Unmapped { index, addr })?;

        let mut cursor = MemoryCursor::new(segment, base, word);
        cursor.seek(addr);
        let header = Ipv4Header::decode(&mut cursor)?;

        Ok(Self {
            descriptor,
            header,
            received_at: chrono::Utc::now().timestamp_millis(),
        })
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} {} ttl={} len={}",
            self.header.source(),
            self.header.destination(),
            self.header.protocol_name(),
            self.header.time_to_live,
            self.header.total_length
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SegmentMemory;

    /// Every field carries a value no other field uses.
    fn marker_header() -> [u8; 20] {
        [
            0x45, // version/ihl
            0xB8, // dscp/ecn
            0x01, 0x02, // total length
            0x03, 0x04, // id
            0x40, 0x05, // flags/fragment offset
            0x3F, // ttl
            0x11, // protocol
            0x06, 0x07, // checksum
            0xC0, 0xA8, 0x00, 0x08, // src
            0xC0, 0xA8, 0x00, 0x09, // dst
        ]
    }

    #[test]
    fn test_fields_decode_in_wire_order() {
        let bytes = marker_header();
        let mut cur = MemoryCursor::new(&bytes, 0, WordSize::Eight);
        let h = Ipv4Header::decode(&mut cur).unwrap();

        assert_eq!(h.version_ihl, 0x45);
        assert_eq!(h.dscp_ecn, 0xB8);
        assert_eq!(h.total_length, 0x0102);
        assert_eq!(h.packet_id, 0x0304);
        assert_eq!(h.fragment_offset, 0x4005);
        assert_eq!(h.time_to_live, 0x3F);
        assert_eq!(h.next_proto_id, 0x11);
        assert_eq!(h.hdr_checksum, 0x0607);
        assert_eq!(h.src_addr, 0xC0A80008);
        assert_eq!(h.dst_addr, 0xC0A80009);
        assert_eq!(cur.consumed_since_last_seek(), 20);
    }

    #[test]
    fn test_raw_encoding_matches_decoder() {
        let bytes = marker_header();
        let mut cur = MemoryCursor::new(&bytes, 0, WordSize::Eight);
        let h = Ipv4Header::decode(&mut cur).unwrap();
        assert_eq!(h.to_raw().to_bytes(), bytes);
    }

    #[test]
    fn test_header_accessors() {
        let h = Ipv4Header {
            version_ihl: 0x45,
            next_proto_id: 6,
            src_addr: u32::from_be_bytes([10, 0, 0, 1]),
            dst_addr: u32::from_be_bytes([192, 168, 1, 100]),
            ..Default::default()
        };
        assert_eq!(h.version(), 4);
        assert_eq!(h.ihl(), 5);
        assert_eq!(h.source().to_string(), "10.0.0.1");
        assert_eq!(h.destination().to_string(), "192.168.1.100");
        assert_eq!(h.protocol_name(), "TCP");
        assert_eq!(Ipv4Header { next_proto_id: 17, ..h }.protocol_name(), "UDP");
        assert_eq!(Ipv4Header { next_proto_id: 47, ..h }.protocol_name(), "IP(47)");
    }

    #[test]
    fn test_descriptor_read_both_widths() {
        let mut wide = Vec::new();
        wide.extend_from_slice(&0xAAAA_0000_0000_0001u64.to_ne_bytes());
        wide.extend_from_slice(&0x7F00_0000_1000u64.to_ne_bytes());
        let mut cur = MemoryCursor::new(&wide, 0, WordSize::Eight);
        let d = PacketDescriptor::read(&mut cur).unwrap();
        assert_eq!(d.handle, 0xAAAA_0000_0000_0001);
        assert_eq!(d.header_addr, 0x7F00_0000_1000);

        let mut narrow = Vec::new();
        narrow.extend_from_slice(&0xBEEFu32.to_ne_bytes());
        narrow.extend_from_slice(&0x4000u32.to_ne_bytes());
        let mut cur = MemoryCursor::new(&narrow, 0, WordSize::Four);
        let d = PacketDescriptor::read(&mut cur).unwrap();
        assert_eq!(d, PacketDescriptor { handle: 0xBEEF, header_addr: 0x4000 });
    }

    #[test]
    fn test_decode_from_segment_offset() {
        let mut seg = vec![0u8; 14];
        seg.extend_from_slice(&marker_header());
        let mut mem = SegmentMemory::new();
        mem.insert(0x9000, seg);

        let desc = PacketDescriptor { handle: 1, header_addr: 0x900E };
        let p = Packet::decode(0, desc, &mem, WordSize::Eight).unwrap();
        assert_eq!(p.descriptor, desc);
        assert_eq!(p.header.time_to_live, 0x3F);
        assert_eq!(p.to_string(), "192.168.0.8 -> 192.168.0.9 UDP ttl=63 len=258");
    }

    #[test]
    fn test_decode_rejects_bad_addresses() {
        let mut mem = SegmentMemory::new();
        mem.insert(0x9000, marker_header().to_vec());

        let null = PacketDescriptor { handle: 1, header_addr: 0 };
        assert_eq!(
            Packet::decode(3, null, &mem, WordSize::Eight).unwrap_err(),
            DecodeError::NullHeader { index: 3 }
        );

        let unmapped = PacketDescriptor { handle: 1, header_addr: 0x5000 };
        assert_eq!(
            Packet::decode(4, unmapped, &mem, WordSize::Eight).unwrap_err(),
            DecodeError::Unmapped { index: 4, addr: 0x5000 }
        );

        // Starts inside the segment but runs off its end.
        let truncated = PacketDescriptor { handle: 1, header_addr: 0x9008 };
        assert!(matches!(
            Packet::decode(5, truncated, &mem, WordSize::Eight),
            Err(DecodeError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_decode_near_top_of_address_space() {
        let mut mem = SegmentMemory::new();
        let mut seg = marker_header().to_vec();
        seg.push(0);
        mem.insert(u64::MAX - 20, seg);

        let fits = PacketDescriptor { handle: 1, header_addr: u64::MAX - 20 };
        let p = Packet::decode(0, fits, &mem, WordSize::Eight).unwrap();
        assert_eq!(p.header.dst_addr, 0xC0A8_0009);

        // Ends on the last address, which the cursor cannot step past.
        let last = PacketDescriptor { handle: 2, header_addr: u64::MAX - 19 };
        let mut mem = SegmentMemory::new();
        mem.insert(u64::MAX - 19, marker_header().to_vec());
        assert!(matches!(
            Packet::decode(1, last, &mem, WordSize::Eight),
            Err(DecodeError::OutOfBounds { .. })
        ));
    }
}
