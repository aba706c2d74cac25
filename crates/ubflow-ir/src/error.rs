//! Error types for tensor descriptors.

/// Errors that can occur when constructing or validating a tensor descriptor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IrError {
    /// A shape has more dimensions than the runtime supports.
    #[error("shape has {rank} dimensions (maximum: {max})")]
    TooManyDims { rank: usize, max: usize },

    /// The product of the dimensions does not fit in a `u64`.
    #[error("element count of shape {0:?} overflows u64")]
    ElementCountOverflow(Vec<u64>),

    /// A data type name could not be parsed.
    #[error("unknown data type '{0}'")]
    UnknownDataType(String),
}
