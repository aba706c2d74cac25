//! ubflow tensor model.
//!
//! Describes the tensors an operator is launched on: their [`Shape`],
//! element [`DataType`] and total element count. Descriptors are immutable
//! once built and owned by the invocation that created them.

mod error;
mod tensor;
mod types;

pub use error::IrError;
pub use tensor::{MAX_DIMS, Shape, TensorDescriptor};
pub use types::{Complex, DataType};
