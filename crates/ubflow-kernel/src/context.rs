//! Per-core launch context.

use std::fmt;

use crate::KernelError;

/// Identity of the core running an engine: its index and the launch width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoreContext {
    block_idx: u64,
    block_num: u64,
}

impl CoreContext {
    /// Creates a context, rejecting a zero-width launch and indices past it.
    pub fn new(block_idx: u64, block_num: u64) -> Result<Self, KernelError> {
        if block_num == 0 {
            return Err(KernelError::ZeroBlockDim);
        }
        if block_idx >= block_num {
            return Err(KernelError::CoreOutOfRange {
                block_idx,
                block_num,
            });
        }
        Ok(Self {
            block_idx,
            block_num,
        })
    }

    /// Index of this core.
    pub fn block_idx(&self) -> u64 {
        self.block_idx
    }

    /// Number of cores in the launch.
    pub fn block_num(&self) -> u64 {
        self.block_num
    }
}

impl fmt::Display for CoreContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "core {}/{}", self.block_idx, self.block_num)
    }
}
