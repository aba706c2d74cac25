//! Multi-core launch.
//!
//! A launch decodes the tiling blob, carves the output into the disjoint
//! per-core ranges the plan describes and runs every core on the rayon pool.
//! Each core decodes the blob again for itself and never touches another
//! core's range. Any core error fails the whole launch.

use std::fmt;

use rayon::prelude::*;
use ubflow_tiling::{CoreAssignment, TilingPlan};

use crate::elementwise::check_operands;
use crate::gather::check_gather;
use crate::reduce::check_inputs;
use crate::{
    CoreContext, CoreReport, ElementwiseKernel, GatherIndex, GatherLayout, KernelError, Operand,
    ReduceKernel, Reduction, combine_partials, run_elementwise_core, run_gather_core,
    run_reduce_core,
};

/// Launch-wide switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Record every pipeline stage in the core reports.
    pub trace: bool,
}

impl LaunchOptions {
    /// Options with stage tracing enabled.
    pub fn traced() -> Self {
        Self { trace: true }
    }
}

/// Per-core results of a launch, in core order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LaunchReport {
    /// One report per launched core.
    pub cores: Vec<CoreReport>,
}

impl LaunchReport {
    /// Sum of pipeline iterations over all cores.
    pub fn total_iterations(&self) -> u64 {
        self.cores.iter().map(|c| c.iterations).sum()
    }

    /// Sum of elements processed over all cores.
    pub fn total_elements(&self) -> u64 {
        self.cores.iter().map(|c| c.elements).sum()
    }
}

impl fmt::Display for LaunchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cores, {} iterations, {} elements",
            self.cores.len(),
            self.total_iterations(),
            self.total_elements()
        )
    }
}

/// Result of a reduction launch.
#[derive(Debug, Clone, PartialEq)]
pub struct ReduceOutput {
    /// The combined value.
    pub value: f32,
    /// Per-core reports of the launch.
    pub report: LaunchReport,
}

/// Splits `output` into each core's clamped range, `per_element` output
/// elements per planned element.
fn split_by_core<'o, T>(
    plan: &TilingPlan,
    mut output: &'o mut [T],
    per_element: u64,
) -> Vec<(CoreAssignment, &'o mut [T])> {
    let total = plan.total_elements;
    plan.assignments()
        .map(|a| {
            let n = (a.valid_elements(total) * per_element) as usize;
            let (head, tail) = std::mem::take(&mut output).split_at_mut(n);
            output = tail;
            (a, head)
        })
        .collect()
}

fn decode(blob: &[u8]) -> Result<TilingPlan, KernelError> {
    let plan = TilingPlan::from_bytes(blob)?;
    if plan.core_count == 0 {
        return Err(KernelError::ZeroBlockDim);
    }
    Ok(plan)
}

fn check_output_len(len: usize, expected: u64) -> Result<(), KernelError> {
    if len as u64 != expected {
        return Err(KernelError::LengthMismatch {
            name: "output".to_string(),
            expected,
            actual: len as u64,
        });
    }
    Ok(())
}

/// Runs an elementwise kernel over every core of the plan in `blob`.
pub fn launch_elementwise<T, K>(
    blob: &[u8],
    kernel: &K,
    inputs: &[Operand<'_, T>],
    output: &mut [T],
    options: &LaunchOptions,
) -> Result<LaunchReport, KernelError>
where
    T: Copy + Default + Send + Sync,
    K: ElementwiseKernel<T> + ?Sized,
{
    let plan = decode(blob)?;
    check_operands(kernel.arity(), inputs, plan.total_elements)?;
    check_output_len(output.len(), plan.total_elements)?;
    log::debug!("launching elementwise kernel: {plan}");

    let block_num = plan.core_count;
    let cores = split_by_core(&plan, output, 1)
        .into_par_iter()
        .map(|(a, chunk)| {
            let ctx = CoreContext::new(a.core_idx, block_num)?;
            let plan = TilingPlan::from_bytes(blob)?;
            run_elementwise_core(ctx, &plan, kernel, inputs, chunk, options.trace)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(LaunchReport { cores })
}

/// Runs a reduction over every core and combines the partials.
///
/// `workspace` receives one partial per core.
pub fn launch_reduce<T, K>(
    blob: &[u8],
    kernel: &K,
    inputs: &[&[T]],
    reduction: Reduction,
    workspace: &mut [f32],
    options: &LaunchOptions,
) -> Result<ReduceOutput, KernelError>
where
    T: Copy + Default + Send + Sync,
    K: ReduceKernel<T> + ?Sized,
{
    let plan = decode(blob)?;
    check_inputs(kernel.arity(), inputs, plan.total_elements)?;
    let cores = plan.core_count as usize;
    if workspace.len() < cores {
        return Err(KernelError::WorkspaceTooSmall {
            expected: cores,
            actual: workspace.len(),
        });
    }
    log::debug!("launching {reduction} reduction: {plan}");

    let partials = &mut workspace[..cores];
    let reports = partials
        .par_iter_mut()
        .enumerate()
        .map(|(idx, slot)| {
            let ctx = CoreContext::new(idx as u64, plan.core_count)?;
            let plan = TilingPlan::from_bytes(blob)?;
            run_reduce_core(ctx, &plan, kernel, inputs, slot, options.trace)
        })
        .collect::<Result<Vec<_>, _>>()?;
    let value = combine_partials(partials, reduction, plan.total_elements);
    Ok(ReduceOutput {
        value,
        report: LaunchReport { cores: reports },
    })
}

/// Runs a gather over every core of the plan in `blob`.
///
/// The plan is over index positions; `output` holds `slice_length` elements
/// per index.
pub fn launch_gather<T, I>(
    blob: &[u8],
    layout: &GatherLayout,
    source: &[T],
    indices: &[I],
    output: &mut [T],
    options: &LaunchOptions,
) -> Result<LaunchReport, KernelError>
where
    T: Copy + Send + Sync,
    I: GatherIndex,
{
    let plan = decode(blob)?;
    check_gather(layout, source, indices, plan.total_elements)?;
    check_output_len(output.len(), plan.total_elements * layout.slice_length)?;
    log::debug!("launching gather ({layout}): {plan}");

    let block_num = plan.core_count;
    let cores = split_by_core(&plan, output, layout.slice_length)
        .into_par_iter()
        .map(|(a, chunk)| {
            let ctx = CoreContext::new(a.core_idx, block_num)?;
            let plan = TilingPlan::from_bytes(blob)?;
            run_gather_core(ctx, &plan, layout, source, indices, chunk, options.trace)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(LaunchReport { cores })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ScratchBuffer, Stage};
    use ubflow_tiling::{HardwareSpec, TilingError, TilingRequest, plan};

    struct Double;

    impl ElementwiseKernel<i32> for Double {
        fn arity(&self) -> usize {
            1
        }

        fn compute(&self, inputs: &[&[i32]], output: &mut [i32], _: &mut ScratchBuffer) {
            for (o, &v) in output.iter_mut().zip(inputs[0]) {
                *o = 2 * v;
            }
        }
    }

    struct Count;

    impl ReduceKernel<i32> for Count {
        fn arity(&self) -> usize {
            1
        }

        fn partial(&self, inputs: &[&[i32]], _: &mut ScratchBuffer) -> f32 {
            inputs[0].len() as f32
        }
    }

    fn hundred_blob() -> Vec<u8> {
        let hw = HardwareSpec::default().with_core_count(4).with_ub_bytes(256);
        plan(&TilingRequest::new(100, 4, 2), &hw).unwrap().to_bytes()
    }

    #[test]
    fn elementwise_covers_every_element_once() {
        let x: Vec<i32> = (0..100).collect();
        let mut y = vec![-1; 100];
        let report = launch_elementwise(
            &hundred_blob(),
            &Double,
            &[Operand::Tensor(&x)],
            &mut y,
            &LaunchOptions::traced(),
        )
        .unwrap();
        assert!(y.iter().zip(&x).all(|(&o, &v)| o == 2 * v));
        assert_eq!(report.cores.len(), 4);
        assert_eq!(report.total_elements(), 100);
        let offsets: Vec<u64> = report.cores.iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![0, 32, 56, 80]);

        // Nothing is copied past element 100.
        let last = &report.cores[3];
        let moved: u64 = last
            .events
            .iter()
            .filter(|e| e.stage == Stage::CopyOut)
            .map(|e| e.elements)
            .sum();
        assert_eq!(moved, 20);
    }

    #[test]
    fn output_length_must_match_plan() {
        let x = vec![0; 100];
        let mut y = vec![0; 104];
        let err = launch_elementwise(
            &hundred_blob(),
            &Double,
            &[Operand::Tensor(&x)],
            &mut y,
            &LaunchOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, KernelError::LengthMismatch { actual: 104, .. }));
    }

    #[test]
    fn corrupt_blob_fails_launch() {
        let mut blob = hundred_blob();
        blob.truncate(50);
        let mut y = vec![0; 100];
        let err = launch_elementwise(
            &blob,
            &Double,
            &[Operand::Scalar(1)],
            &mut y,
            &LaunchOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            KernelError::Tiling(TilingError::BlobLength { actual: 50, .. })
        ));
    }

    #[test]
    fn reduce_partials_in_core_order() {
        let x = vec![0; 100];
        let mut workspace = vec![0.0; 8];
        let out = launch_reduce(
            &hundred_blob(),
            &Count,
            &[x.as_slice()],
            Reduction::Sum,
            &mut workspace,
            &LaunchOptions::default(),
        )
        .unwrap();
        assert_eq!(out.value, 100.0);
        assert_eq!(&workspace[..4], &[32.0, 24.0, 24.0, 20.0]);
    }

    #[test]
    fn reduce_needs_workspace_per_core() {
        let x = vec![0; 100];
        let mut workspace = vec![0.0; 2];
        let err = launch_reduce(
            &hundred_blob(),
            &Count,
            &[x.as_slice()],
            Reduction::Mean,
            &mut workspace,
            &LaunchOptions::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            KernelError::WorkspaceTooSmall {
                expected: 4,
                actual: 2
            }
        );
    }

    #[test]
    fn gather_across_cores() {
        // 40 indices of width 4 on 4 cores with 16-element tiles.
        let hw = HardwareSpec::default().with_core_count(4).with_ub_bytes(256);
        let blob = plan(&TilingRequest::new(40, 4, 2), &hw).unwrap().to_bytes();
        let layout = GatherLayout {
            batch_length: 10,
            indices_length: 40,
            slice_length: 2,
            axis_length: 5,
        };
        let source: Vec<i64> = (0..10).collect();
        let indices: Vec<i32> = (0..40).map(|i| 4 - i % 5).collect();
        let mut out = vec![0i64; 80];
        let report =
            launch_gather(&blob, &layout, &source, &indices, &mut out, &LaunchOptions::default())
                .unwrap();
        assert!(report.cores.len() > 1);
        for (p, &idx) in indices.iter().enumerate() {
            let row = idx as i64;
            assert_eq!(&out[2 * p..2 * p + 2], &[2 * row, 2 * row + 1]);
        }
    }
}
