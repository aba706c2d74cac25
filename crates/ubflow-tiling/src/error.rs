//! Planning and tiling-blob errors.

/// Errors that prevent a tiling plan from being produced or decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TilingError {
    /// The hardware reports no usable cores.
    #[error("hardware core count is zero")]
    ZeroCoreCount,

    /// The alignment block size is zero.
    #[error("alignment block size is zero")]
    ZeroAlignment,

    /// The element width is zero or does not divide the alignment block.
    #[error("element width {width} does not divide the {alignment}-byte alignment block")]
    InvalidElementWidth { width: u64, alignment: u64 },

    /// The operator declared no live buffers.
    #[error("live buffer count is zero")]
    ZeroLiveBuffers,

    /// The on-chip buffer cannot hold one aligned block per live buffer slot.
    #[error(
        "on-chip buffer of {ub_bytes} bytes cannot hold one aligned tile for {live_buffers} double-buffered live buffers"
    )]
    BufferTooSmall { ub_bytes: u64, live_buffers: u64 },

    /// A byte or element count does not fit in `u64`.
    #[error("tensor byte size overflows u64")]
    Overflow,

    /// A tiling blob has the wrong length.
    #[error("tiling blob is {actual} bytes (expected {expected})")]
    BlobLength { expected: usize, actual: usize },

    /// A decoded tiling blob violates a plan invariant.
    #[error("corrupt tiling blob: {0}")]
    CorruptBlob(String),
}
