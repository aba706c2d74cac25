//! Reduction engine.
//!
//! Each core folds its tiles into one `f32` partial and stores it in its own
//! workspace slot. The host combines the partials in core order, so no core
//! ever reads another core's result.

use std::fmt;

use ubflow_tiling::{CoreAssignment, TilingPlan};

use crate::pipeline::{Stages, run_pipeline};
use crate::{CoreContext, CoreReport, KernelError, LocalTensor, PipelineQueue, ScratchBuffer};

/// How per-core partial sums become the final value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Reduction {
    /// Sum of all contributions.
    Sum,
    /// Sum divided by the element count.
    #[default]
    Mean,
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sum => f.write_str("sum"),
            Self::Mean => f.write_str("mean"),
        }
    }
}

/// The per-tile contribution of a reducing operator.
pub trait ReduceKernel<T>: Sync {
    /// Number of inputs.
    fn arity(&self) -> usize;

    /// `f32` scratch regions per tile element to reserve at init.
    fn scratch_lanes(&self) -> usize {
        0
    }

    /// Sum of this tile's contributions.
    fn partial(&self, inputs: &[&[T]], scratch: &mut ScratchBuffer) -> f32;
}

struct ReduceCore<'a, 'k, T, K: ?Sized> {
    assignment: CoreAssignment,
    total: u64,
    kernel: &'k K,
    inputs: &'a [&'a [T]],
    in_queues: Vec<PipelineQueue<T>>,
    scratch: ScratchBuffer,
    acc: f32,
}

impl<T, K> Stages for ReduceCore<'_, '_, T, K>
where
    T: Copy + Default,
    K: ReduceKernel<T> + ?Sized,
{
    const COPY_OUT: bool = false;

    fn copy_in(&mut self, i: u64) -> Result<u64, KernelError> {
        let count = self.assignment.clamped_iteration_elements(i, self.total) as usize;
        let start = (self.assignment.offset + i * self.assignment.tile_elements) as usize;
        for (queue, src) in self.in_queues.iter_mut().zip(self.inputs) {
            let mut local = queue.alloc()?;
            local.copy_from(&src[start..start + count])?;
            queue.enque(local);
        }
        Ok(count as u64)
    }

    fn compute(&mut self, _i: u64) -> Result<u64, KernelError> {
        let locals = self
            .in_queues
            .iter_mut()
            .map(PipelineQueue::deque)
            .collect::<Result<Vec<LocalTensor<T>>, _>>()?;
        let views: Vec<&[T]> = locals.iter().map(LocalTensor::as_slice).collect();
        let count = views.first().map_or(0, |v| v.len());
        self.acc += self.kernel.partial(&views, &mut self.scratch);
        for (queue, local) in self.in_queues.iter_mut().zip(locals) {
            queue.free(local);
        }
        Ok(count as u64)
    }

    fn copy_out(&mut self, _i: u64) -> Result<u64, KernelError> {
        Ok(0)
    }
}

/// Checks input count and lengths for a reduction.
pub(crate) fn check_inputs<T>(
    arity: usize,
    inputs: &[&[T]],
    total: u64,
) -> Result<(), KernelError> {
    if inputs.len() != arity {
        return Err(KernelError::ArityMismatch {
            expected: arity,
            actual: inputs.len(),
        });
    }
    for (i, input) in inputs.iter().enumerate() {
        if input.len() as u64 != total {
            return Err(KernelError::LengthMismatch {
                name: format!("input {i}"),
                expected: total,
                actual: input.len() as u64,
            });
        }
    }
    Ok(())
}

/// Runs one core of a reduction and writes its partial to `partial`.
pub fn run_reduce_core<T, K>(
    ctx: CoreContext,
    plan: &TilingPlan,
    kernel: &K,
    inputs: &[&[T]],
    partial: &mut f32,
    trace: bool,
) -> Result<CoreReport, KernelError>
where
    T: Copy + Default,
    K: ReduceKernel<T> + ?Sized,
{
    let total = plan.total_elements;
    check_inputs(kernel.arity(), inputs, total)?;
    let assignment = plan.assignment(ctx.block_idx());
    let tile = plan.tile_elements as usize;
    let mut core = ReduceCore {
        assignment,
        total,
        kernel,
        inputs,
        in_queues: (0..inputs.len())
            .map(|_| PipelineQueue::double_buffered(tile))
            .collect(),
        scratch: ScratchBuffer::new(tile * kernel.scratch_lanes()),
        acc: 0.0,
    };
    let report = run_pipeline(ctx, &assignment, total, &mut core, trace)?;
    *partial = core.acc;
    Ok(report)
}

/// Combines per-core partials in core order.
///
/// A mean over zero elements is NaN, matching `0 / 0`.
pub fn combine_partials(partials: &[f32], reduction: Reduction, total: u64) -> f32 {
    let sum: f32 = partials.iter().sum();
    match reduction {
        Reduction::Sum => sum,
        Reduction::Mean => sum / total as f32,
    }
}
