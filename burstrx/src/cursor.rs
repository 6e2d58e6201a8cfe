use crate::error::DecodeError;

/// Machine-word width used by the descriptor array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordSize {
    Four,
    Eight,
}

impl WordSize {
    /// Pointer width of the host.
    pub const fn native() -> Self {
        if core::mem::size_of::<usize>() == 4 {
            WordSize::Four
        } else {
            WordSize::Eight
        }
    }

    pub const fn bytes(self) -> usize {
        match self {
            WordSize::Four => 4,
            WordSize::Eight => 8,
        }
    }

    pub fn from_bytes(bytes: usize) -> Option<Self> {
        match bytes {
            4 => Some(WordSize::Four),
            8 => Some(WordSize::Eight),
            _ => None,
        }
    }
}

impl Default for WordSize {
    fn default() -> Self {
        Self::native()
    }
}

/// Sequential reader over a window of memory mapped at `base`.
///
/// Positions are absolute addresses. `seek` accepts any address; a read that
/// would leave the window fails with [`DecodeError::OutOfBounds`] and does not
/// move the cursor.
#[derive(Debug, Clone)]
pub struct MemoryCursor<'a> {
    window: &'a [u8],
    base: u64,
    pos: u64,
    mark: u64,
    word: WordSize,
}

impl<'a> MemoryCursor<'a> {
    pub fn new(window: &'a [u8], base: u64, word: WordSize) -> Self {
        Self {
            window,
            base,
            pos: base,
            mark: base,
            word,
        }
    }

    pub fn seek(&mut self, position: u64) {
        self.pos = position;
        self.mark = position;
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn word_size(&self) -> WordSize {
        self.word
    }

    /// Bytes read since the last [`seek`](Self::seek).
    pub fn consumed_since_last_seek(&self) -> usize {
        (self.pos - self.mark) as usize
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        self.take().map(u16::from_ne_bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        self.take().map(u32::from_ne_bytes)
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        self.take().map(u64::from_ne_bytes)
    }

    /// Network byte order.
    pub fn read_be_u16(&mut self) -> Result<u16, DecodeError> {
        self.take().map(u16::from_be_bytes)
    }

    /// Network byte order.
    pub fn read_be_u32(&mut self) -> Result<u32, DecodeError> {
        self.take().map(u32::from_be_bytes)
    }

    /// Reads one machine word, widened to 64 bits.
    pub fn read_word(&mut self) -> Result<u64, DecodeError> {
        match self.word {
            WordSize::Four => self.read_u32().map(u64::from),
            WordSize::Eight => self.read_u64(),
        }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        // The position after the read must be addressable too, so the final
        // byte of the address space is never readable.
        let (start, next) = self
            .pos
            .checked_sub(self.base)
            .and_then(|off| usize::try_from(off).ok())
            .filter(|off| off.checked_add(N).is_some_and(|end| end <= self.window.len()))
            .zip(self.pos.checked_add(N as u64))
            .ok_or(DecodeError::OutOfBounds {
                addr: self.pos,
                len: N,
                base: self.base,
                end: self.base.saturating_add(self.window.len() as u64),
            })?;

        let mut out = [0u8; N];
        out.copy_from_slice(&self.window[start..start + N]);
        self.pos = next;
        Ok(out)
    }
}
