//! Operator errors.

use ubflow_ir::{DataType, IrError, Shape};
use ubflow_kernel::KernelError;
use ubflow_tiling::TilingError;

/// Errors raised while inferring, planning or executing an operator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OpError {
    /// The operator does not accept this element type on this target.
    #[error("{op} does not support {dtype} on {target}")]
    UnsupportedDtype {
        op: String,
        dtype: DataType,
        target: String,
    },

    /// Wrong number of input tensors.
    #[error("{op} takes {expected} inputs, got {actual}")]
    InputCount {
        op: String,
        expected: usize,
        actual: usize,
    },

    /// Input shapes that must agree do not.
    #[error("{op}: shape {actual} does not match {expected}")]
    ShapeMismatch {
        op: String,
        expected: Shape,
        actual: Shape,
    },

    /// Inputs that must share an element type do not.
    #[error("{op}: input dtype {actual} does not match {expected}")]
    DtypeMismatch {
        op: String,
        expected: DataType,
        actual: DataType,
    },

    /// An attribute is missing, mistyped or out of range.
    #[error("invalid attribute '{name}': {reason}")]
    InvalidAttr { name: String, reason: String },

    /// Tensor data that does not match its descriptor.
    #[error("tensor data has {actual} {dtype} elements, descriptor {expected}")]
    DataMismatch {
        dtype: DataType,
        expected: u64,
        actual: u64,
    },

    /// No operator with this name is registered.
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error(transparent)]
    Ir(#[from] IrError),

    #[error(transparent)]
    Tiling(#[from] TilingError),

    #[error(transparent)]
    Kernel(#[from] KernelError),
}

impl OpError {
    /// Shorthand for [`OpError::InvalidAttr`].
    pub fn invalid_attr(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidAttr {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
