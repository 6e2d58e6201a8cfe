use burstrx_common::{region_len, DescriptorPair, COUNT_FIELD_LEN, DEFAULT_MAX_BURST};

use crate::cursor::{MemoryCursor, WordSize};
use crate::error::{BatchError, PollError};

/// Shape of a batch region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLayout {
    /// Most descriptor pairs a single receive call may write.
    pub max_burst: usize,
    /// Bytes between the count field and the descriptor array.
    pub header_gap: usize,
    pub word_size: WordSize,
}

impl Default for BatchLayout {
    fn default() -> Self {
        Self {
            max_burst: DEFAULT_MAX_BURST,
            header_gap: 0,
            word_size: WordSize::native(),
        }
    }
}

impl BatchLayout {
    /// Region size in bytes, `None` if it overflows.
    pub fn region_len(&self) -> Option<usize> {
        region_len(self.header_gap, self.max_burst, self.word_size.bytes())
    }

    /// Distance between consecutive descriptor pairs.
    pub fn pair_stride(&self) -> usize {
        2 * self.word_size.bytes()
    }

    /// Offset of descriptor pair `index` from the region start.
    pub fn pair_offset(&self, index: usize) -> usize {
        COUNT_FIELD_LEN + self.header_gap + index * self.pair_stride()
    }
}

/// Memory block a receive call writes one burst into.
///
/// The poller allocates one region up front and zeroes it before every
/// receive call, so the block lives exactly as long as the poller.
#[derive(Debug)]
pub struct BatchRegion {
    layout: BatchLayout,
    bytes: Vec<u8>,
}

impl BatchRegion {
    pub fn allocate(layout: BatchLayout) -> Result<Self, PollError> {
        let size = layout.region_len().ok_or(PollError::RegionOverflow {
            header_gap: layout.header_gap,
            max_burst: layout.max_burst,
        })?;
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(size)
            .map_err(|_| PollError::Allocation { size })?;
        bytes.resize(size, 0);
        Ok(Self { layout, bytes })
    }

    pub fn layout(&self) -> &BatchLayout {
        &self.layout
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Raw access for receive implementations that fill the region directly.
    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn reset(&mut self) {
        self.bytes.fill(0);
    }

    /// Cursor over the region, which is mapped at address 0.
    pub fn cursor(&self) -> MemoryCursor<'_> {
        MemoryCursor::new(&self.bytes, 0, self.layout.word_size)
    }

    pub fn write_count(&mut self, count: u16) {
        self.bytes[..COUNT_FIELD_LEN].copy_from_slice(&count.to_ne_bytes());
    }

    /// Writes descriptor pair `index` using the region's word size. With 4-byte
    /// words the upper halves of the handle and address are dropped.
    pub fn write_pair(&mut self, index: usize, pair: DescriptorPair) -> Result<(), BatchError> {
        if index >= self.layout.max_burst {
            return Err(BatchError::CountExceedsBurst {
                count: index + 1,
                max_burst: self.layout.max_burst,
            });
        }
        let offset = self.layout.pair_offset(index);
        let word = self.layout.word_size.bytes();
        let slot = &mut self.bytes[offset..offset + 2 * word];
        match self.layout.word_size {
            WordSize::Four => {
                slot[..4].copy_from_slice(&(pair.handle as u32).to_ne_bytes());
                slot[4..].copy_from_slice(&(pair.header_addr as u32).to_ne_bytes());
            }
            WordSize::Eight => {
                slot[..8].copy_from_slice(&pair.handle.to_ne_bytes());
                slot[8..].copy_from_slice(&pair.header_addr.to_ne_bytes());
            }
        }
        Ok(())
    }
}
