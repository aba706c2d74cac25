//! Streaming compute engine for ubflow kernels.
//!
//! Every core executes its slice of a [`TilingPlan`](ubflow_tiling::TilingPlan)
//! as a software pipeline of copy-in, compute and copy-out stages over
//! double-buffered on-chip slots. The engine is generic over the per-tile
//! transform: elementwise kernels, reductions with a host-side combine, and
//! indexed gathers share the same scheduling and queue machinery.

mod context;
mod elementwise;
mod error;
mod gather;
mod launch;
mod pipeline;
mod precision;
mod queue;
mod reduce;

pub use context::CoreContext;
pub use elementwise::{ElementwiseKernel, Operand, run_elementwise_core};
pub use error::KernelError;
pub use gather::{GatherIndex, GatherLayout, run_gather_core};
pub use launch::{
    LaunchOptions, LaunchReport, ReduceOutput, launch_elementwise, launch_gather, launch_reduce,
};
pub use pipeline::{CoreReport, PipelineEvent, Stage};
pub use precision::{Element, RoundMode, WorkingPrecision};
pub use queue::{BUFFER_NUM, LocalTensor, PipelineQueue, ScratchBuffer};
pub use reduce::{ReduceKernel, Reduction, combine_partials, run_reduce_core};
