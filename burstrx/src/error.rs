use thiserror::Error;

/// Failure to decode a value out of a memory window.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("read of {len} bytes at {addr:#x} falls outside window {base:#x}..{end:#x}")]
    OutOfBounds {
        addr: u64,
        len: usize,
        base: u64,
        end: u64,
    },

    #[error("null header address in descriptor {index}")]
    NullHeader { index: usize },

    #[error("header address {addr:#x} in descriptor {index} is not mapped")]
    Unmapped { index: usize, addr: u64 },
}

/// Failure reported by a burst receive call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReceiveError {
    /// The interface is temporarily unavailable; the poll should be retried.
    #[error("transient receive failure: {0}")]
    Transient(String),

    #[error("receive failed: {0}")]
    Fatal(String),
}

/// A batch whose header disagrees with the region it was written into.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("batch reports {count} packets, burst limit is {max_burst}")]
    CountExceedsBurst { count: usize, max_burst: usize },

    #[error("batch header unreadable: {0}")]
    Header(#[from] DecodeError),
}

/// Errors that stop the poll loop.
#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Receive(#[from] ReceiveError),

    #[error("cannot allocate batch region of {size} bytes")]
    Allocation { size: usize },

    #[error("batch region for {max_burst} pairs after a {header_gap}-byte gap overflows")]
    RegionOverflow { header_gap: usize, max_burst: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("max_burst must be between 1 and 65535, got {got}")]
    MaxBurst { got: usize },

    #[error("word_size must be 4 or 8, got {0}")]
    WordSize(usize),

    #[error("header_gap of {got} bytes makes the batch region overflow")]
    HeaderGap { got: usize },
}
