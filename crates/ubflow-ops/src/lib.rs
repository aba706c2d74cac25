//! Operator catalogue for ubflow.
//!
//! Each [`Operator`] pairs a tiling function (descriptors and attributes in,
//! [`TilingPlan`](ubflow_tiling::TilingPlan) out) with a kernel that runs on
//! the streaming engine from the serialized plan. The [`OperatorRegistry`]
//! resolves operators by name for the command line and for tests.

mod attrs;
mod error;
mod operator;
pub mod ops;
mod registry;
mod tensor;

pub use attrs::{AttrValue, Attrs};
pub use error::OpError;
pub use operator::{Execution, Operator};
pub use registry::{OpRun, OperatorRegistry, run_operator};
pub use tensor::{HostTensor, Storage, TensorData};
