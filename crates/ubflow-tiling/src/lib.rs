//! Tiling planner for ubflow kernels.
//!
//! Partitions a tensor's element range across cores (big-core/small-core
//! load balancing on 32-byte blocks) and sizes the per-iteration tile so the
//! double-buffered pipeline fits in the on-chip buffer. The resulting
//! [`TilingPlan`] is serialized to a fixed little-endian blob
//! ([`TilingData`]) that the compute engine decodes at launch.

mod blob;
mod error;
mod hardware;
mod plan;

pub use blob::TilingData;
pub use error::TilingError;
pub use hardware::HardwareSpec;
pub use plan::{CoreAssignment, CoreClassPlan, TilingPlan, TilingRequest, plan};

/// Number of alternating slots per pipeline queue.
pub const DOUBLE_BUFFER: u64 = 2;

/// Number of operator scalar parameters carried in a plan.
pub const SCALAR_SLOTS: usize = 4;
