use std::collections::BTreeMap;

/// Address space that packet header addresses point into.
///
/// Header addresses found in a batch region are only trusted after they
/// resolve to a mapped segment here; decoding then stays inside that segment.
pub trait PacketMemory {
    /// Mapped segment containing `addr`, as its base address and bytes.
    fn segment(&self, addr: u64) -> Option<(u64, &[u8])>;
}

/// Packet memory made of owned, non-overlapping segments keyed by base address.
#[derive(Debug, Clone, Default)]
pub struct SegmentMemory {
    segments: BTreeMap<u64, Vec<u8>>,
}

impl SegmentMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `bytes` at `base`, replacing any segment with the same base.
    pub fn insert(&mut self, base: u64, bytes: Vec<u8>) {
        self.segments.insert(base, bytes);
    }

    pub fn clear(&mut self) {
        self.segments.clear();
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl PacketMemory for SegmentMemory {
    fn segment(&self, addr: u64) -> Option<(u64, &[u8])> {
        let (base, bytes) = self.segments.range(..=addr).next_back()?;
        if addr - base < bytes.len() as u64 {
            Some((*base, bytes.as_slice()))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_lookup() {
        let mut mem = SegmentMemory::new();
        mem.insert(0x1000, vec![0; 64]);
        mem.insert(0x2000, vec![0; 20]);

        assert_eq!(mem.segment(0x1000).map(|(b, _)| b), Some(0x1000));
        assert_eq!(mem.segment(0x103F).map(|(b, _)| b), Some(0x1000));
        assert_eq!(mem.segment(0x2013).map(|(b, s)| (b, s.len())), Some((0x2000, 20)));
    }

    #[test]
    fn test_unmapped_addresses() {
        let mut mem = SegmentMemory::new();
        mem.insert(0x1000, vec![0; 64]);

        assert!(mem.segment(0).is_none());
        assert!(mem.segment(0x0FFF).is_none());
        assert!(mem.segment(0x1040).is_none());
        assert!(mem.segment(u64::MAX).is_none());
    }

    #[test]
    fn test_clear() {
        let mut mem = SegmentMemory::new();
        mem.insert(0x10, vec![1]);
        assert_eq!(mem.len(), 1);
        mem.clear();
        assert!(mem.is_empty());
        assert!(mem.segment(0x10).is_none());
    }
}
