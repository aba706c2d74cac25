//! Elementwise engine: one output element per input element.

use ubflow_tiling::{CoreAssignment, TilingPlan};

use crate::pipeline::{Stages, run_pipeline};
use crate::{
    CoreContext, CoreReport, KernelError, LocalTensor, PipelineQueue, ScratchBuffer,
};

/// An input bound to an elementwise kernel.
#[derive(Debug, Clone, Copy)]
pub enum Operand<'a, T> {
    /// A tensor with one element per output element.
    Tensor(&'a [T]),
    /// A value broadcast to every element.
    Scalar(T),
}

impl<T> Operand<'_, T> {
    /// Element count of a tensor operand.
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Tensor(t) => Some(t.len()),
            Self::Scalar(_) => None,
        }
    }
}

/// The per-tile transform of an elementwise operator.
///
/// `compute` receives one slice per input, all of the output's length.
pub trait ElementwiseKernel<T>: Sync {
    /// Number of inputs (1 to 3).
    fn arity(&self) -> usize;

    /// `f32` scratch regions per tile element to reserve at init.
    fn scratch_lanes(&self) -> usize {
        0
    }

    /// Transforms one tile.
    fn compute(&self, inputs: &[&[T]], output: &mut [T], scratch: &mut ScratchBuffer);
}

/// Checks operand count and lengths against the plan.
pub(crate) fn check_operands<T>(
    arity: usize,
    inputs: &[Operand<'_, T>],
    total: u64,
) -> Result<(), KernelError> {
    if inputs.len() != arity {
        return Err(KernelError::ArityMismatch {
            expected: arity,
            actual: inputs.len(),
        });
    }
    for (i, input) in inputs.iter().enumerate() {
        if let Some(len) = input.len()
            && len as u64 != total
        {
            return Err(KernelError::LengthMismatch {
                name: format!("input {i}"),
                expected: total,
                actual: len as u64,
            });
        }
    }
    Ok(())
}

struct ElementwiseCore<'a, 'k, T, K: ?Sized> {
    assignment: CoreAssignment,
    total: u64,
    kernel: &'k K,
    inputs: &'a [Operand<'a, T>],
    output: &'a mut [T],
    in_queues: Vec<PipelineQueue<T>>,
    out_queue: PipelineQueue<T>,
    scratch: ScratchBuffer,
}

impl<T, K> ElementwiseCore<'_, '_, T, K>
where
    T: Copy + Default,
    K: ElementwiseKernel<T> + ?Sized,
{
    fn count(&self, i: u64) -> usize {
        self.assignment.clamped_iteration_elements(i, self.total) as usize
    }
}

impl<T, K> Stages for ElementwiseCore<'_, '_, T, K>
where
    T: Copy + Default,
    K: ElementwiseKernel<T> + ?Sized,
{
    fn copy_in(&mut self, i: u64) -> Result<u64, KernelError> {
        let count = self.count(i);
        let start = (self.assignment.offset + i * self.assignment.tile_elements) as usize;
        for (queue, input) in self.in_queues.iter_mut().zip(self.inputs) {
            let mut local = queue.alloc()?;
            match input {
                Operand::Tensor(src) => local.copy_from(&src[start..start + count])?,
                Operand::Scalar(v) => local.fill(*v, count)?,
            }
            queue.enque(local);
        }
        Ok(count as u64)
    }

    fn compute(&mut self, i: u64) -> Result<u64, KernelError> {
        let count = self.count(i);
        let locals = self
            .in_queues
            .iter_mut()
            .map(PipelineQueue::deque)
            .collect::<Result<Vec<LocalTensor<T>>, _>>()?;
        let mut out = self.out_queue.alloc()?;
        out.set_len(count)?;
        let views: Vec<&[T]> = locals.iter().map(LocalTensor::as_slice).collect();
        self.kernel
            .compute(&views, out.as_mut_slice(), &mut self.scratch);
        self.out_queue.enque(out);
        for (queue, local) in self.in_queues.iter_mut().zip(locals) {
            queue.free(local);
        }
        Ok(count as u64)
    }

    fn copy_out(&mut self, i: u64) -> Result<u64, KernelError> {
        let out = self.out_queue.deque()?;
        let start = (i * self.assignment.tile_elements) as usize;
        let n = out.len();
        self.output[start..start + n].copy_from_slice(out.as_slice());
        self.out_queue.free(out);
        Ok(n as u64)
    }
}

/// Runs one core of an elementwise launch.
///
/// `output` is this core's part of the output tensor: the plan range of
/// `ctx.block_idx()` clamped to the tensor end.
pub fn run_elementwise_core<T, K>(
    ctx: CoreContext,
    plan: &TilingPlan,
    kernel: &K,
    inputs: &[Operand<'_, T>],
    output: &mut [T],
    trace: bool,
) -> Result<CoreReport, KernelError>
where
    T: Copy + Default,
    K: ElementwiseKernel<T> + ?Sized,
{
    let total = plan.total_elements;
    check_operands(kernel.arity(), inputs, total)?;
    let assignment = plan.assignment(ctx.block_idx());
    let valid = assignment.valid_elements(total);
    if output.len() as u64 != valid {
        return Err(KernelError::LengthMismatch {
            name: format!("{ctx} output"),
            expected: valid,
            actual: output.len() as u64,
        });
    }

    let tile = plan.tile_elements as usize;
    let mut core = ElementwiseCore {
        assignment,
        total,
        kernel,
        inputs,
        output,
        in_queues: (0..inputs.len())
            .map(|_| PipelineQueue::double_buffered(tile))
            .collect(),
        out_queue: PipelineQueue::double_buffered(tile),
        scratch: ScratchBuffer::new(tile * kernel.scratch_lanes()),
    };
    run_pipeline(ctx, &assignment, total, &mut core, trace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Stage;
    use ubflow_tiling::{HardwareSpec, TilingRequest, plan};

    struct AddScaled;

    impl ElementwiseKernel<f32> for AddScaled {
        fn arity(&self) -> usize {
            2
        }

        fn compute(&self, inputs: &[&[f32]], output: &mut [f32], _: &mut ScratchBuffer) {
            for ((o, &a), &b) in output.iter_mut().zip(inputs[0]).zip(inputs[1]) {
                *o = a + 2.0 * b;
            }
        }
    }

    fn hundred_plan() -> TilingPlan {
        let hw = HardwareSpec::default().with_core_count(4).with_ub_bytes(256);
        plan(&TilingRequest::new(100, 4, 2), &hw).unwrap()
    }

    #[test]
    fn last_core_stops_at_tensor_end() {
        let p = hundred_plan();
        let x: Vec<f32> = (0..100).map(|v| v as f32).collect();
        let ctx = CoreContext::new(3, 4).unwrap();
        let mut out = vec![0.0; 20];
        let report = run_elementwise_core(
            ctx,
            &p,
            &AddScaled,
            &[Operand::Tensor(&x), Operand::Scalar(1.0)],
            &mut out,
            true,
        )
        .unwrap();
        assert_eq!(report.offset, 80);
        assert_eq!(report.elements, 20);
        assert_eq!(out[0], 82.0);
        assert_eq!(out[19], 101.0);
        let copied: Vec<u64> = report
            .events
            .iter()
            .filter(|e| e.stage == Stage::CopyIn)
            .map(|e| e.elements)
            .collect();
        assert_eq!(copied, vec![16, 4]);
    }

    #[test]
    fn wrong_output_chunk_is_rejected() {
        let p = hundred_plan();
        let x = vec![0.0f32; 100];
        let ctx = CoreContext::new(0, 4).unwrap();
        let mut out = vec![0.0; 24];
        let err = run_elementwise_core(
            ctx,
            &p,
            &AddScaled,
            &[Operand::Tensor(&x), Operand::Tensor(&x)],
            &mut out,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, KernelError::LengthMismatch { expected: 32, .. }));
    }

    #[test]
    fn arity_is_checked() {
        let x = [1.0f32];
        assert_eq!(
            check_operands(2, &[Operand::Tensor(&x[..])], 1),
            Err(KernelError::ArityMismatch {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn short_input_is_rejected() {
        let x = [1.0f32; 3];
        assert!(matches!(
            check_operands(1, &[Operand::Tensor(&x[..])], 4),
            Err(KernelError::LengthMismatch { actual: 3, .. })
        ));
    }
}
