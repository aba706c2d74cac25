//! Compute engine errors.

use ubflow_tiling::TilingError;

/// Errors that abort a kernel launch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    /// The launch declared zero cores.
    #[error("block dim can not be zero")]
    ZeroBlockDim,

    /// A core index at or beyond the declared core count.
    #[error("core {block_idx} is outside a launch of {block_num} cores")]
    CoreOutOfRange { block_idx: u64, block_num: u64 },

    /// All slots of a pipeline queue are already allocated.
    #[error("pipeline queue exhausted: all {slots} slots in use")]
    QueueExhausted { slots: usize },

    /// Dequeue from a queue with nothing enqueued.
    #[error("pipeline queue is empty")]
    QueueEmpty,

    /// A tile larger than the slot it is copied into.
    #[error("tile of {requested} elements exceeds slot capacity {capacity}")]
    SlotOverflow { requested: usize, capacity: usize },

    /// The number of bound inputs does not match the kernel arity.
    #[error("kernel takes {expected} inputs, {actual} bound")]
    ArityMismatch { expected: usize, actual: usize },

    /// A bound tensor does not have the planned element count.
    #[error("{name} has {actual} elements, plan expects {expected}")]
    LengthMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },

    /// The reduction workspace has fewer slots than launched cores.
    #[error("workspace holds {actual} partials, launch needs {expected}")]
    WorkspaceTooSmall { expected: usize, actual: usize },

    /// A gather index outside the gathered axis.
    #[error("index {index} at position {position} is out of range for axis of length {bound}")]
    IndexOutOfRange {
        position: u64,
        index: i64,
        bound: u64,
    },

    /// The tiling blob could not be decoded.
    #[error(transparent)]
    Tiling(#[from] TilingError),
}
