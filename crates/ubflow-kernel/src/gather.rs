//! Indexed gather engine.
//!
//! The index tensor is the streamed operand: each core owns a range of
//! index positions, copies a tile of indices on chip, resolves them to
//! source offsets, and copies one contiguous slice of the source per index
//! straight into its part of the output.

use std::fmt;

use ubflow_tiling::{CoreAssignment, TilingPlan};

use crate::pipeline::{Stages, run_pipeline};
use crate::{CoreContext, CoreReport, KernelError, PipelineQueue};

/// Integer types accepted as gather indices.
pub trait GatherIndex: Copy + Default + Send + Sync + Into<i64> {}

impl GatherIndex for i32 {}
impl GatherIndex for i64 {}

/// Flattened geometry of a gather.
///
/// The source is `batch_count` batches of `batch_length` elements; each batch
/// is `axis_length` slices of `slice_length` elements. Every index position
/// belongs to batch `position / indices_length` and selects one slice of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatherLayout {
    /// Source elements per batch.
    pub batch_length: u64,
    /// Index positions per batch.
    pub indices_length: u64,
    /// Elements copied per index.
    pub slice_length: u64,
    /// Number of selectable slices; valid indices are `[0, axis_length)`.
    pub axis_length: u64,
}

impl GatherLayout {
    /// Number of batches covered by `index_count` indices.
    pub fn batch_count(&self, index_count: u64) -> u64 {
        index_count.checked_div(self.indices_length).unwrap_or(0)
    }
}

impl fmt::Display for GatherLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch {} x {} indices, slice {} of axis {}",
            self.batch_length, self.indices_length, self.slice_length, self.axis_length
        )
    }
}

/// Checks the bound tensors against the layout and the plan's index count.
pub(crate) fn check_gather<T, I>(
    layout: &GatherLayout,
    source: &[T],
    indices: &[I],
    total: u64,
) -> Result<(), KernelError> {
    if indices.len() as u64 != total {
        return Err(KernelError::LengthMismatch {
            name: "indices".to_string(),
            expected: total,
            actual: indices.len() as u64,
        });
    }
    if total > 0 && (layout.indices_length == 0 || total % layout.indices_length != 0) {
        return Err(KernelError::LengthMismatch {
            name: "indices per batch".to_string(),
            expected: total,
            actual: layout.indices_length,
        });
    }
    let span = layout.axis_length.checked_mul(layout.slice_length);
    if span.is_none_or(|span| span > layout.batch_length) {
        return Err(KernelError::LengthMismatch {
            name: "batch".to_string(),
            expected: span.unwrap_or(u64::MAX),
            actual: layout.batch_length,
        });
    }
    let expected = layout.batch_count(total) * layout.batch_length;
    if total > 0 && source.len() as u64 != expected {
        return Err(KernelError::LengthMismatch {
            name: "source".to_string(),
            expected,
            actual: source.len() as u64,
        });
    }
    Ok(())
}

struct GatherCore<'a, T, I> {
    assignment: CoreAssignment,
    total: u64,
    layout: GatherLayout,
    source: &'a [T],
    indices: &'a [I],
    output: &'a mut [T],
    index_queue: PipelineQueue<I>,
    offset_queue: PipelineQueue<u64>,
}

impl<T: Copy, I: GatherIndex> Stages for GatherCore<'_, T, I> {
    fn copy_in(&mut self, i: u64) -> Result<u64, KernelError> {
        let count = self.assignment.clamped_iteration_elements(i, self.total) as usize;
        let start = (self.assignment.offset + i * self.assignment.tile_elements) as usize;
        let mut local = self.index_queue.alloc()?;
        local.copy_from(&self.indices[start..start + count])?;
        self.index_queue.enque(local);
        Ok(count as u64)
    }

    fn compute(&mut self, i: u64) -> Result<u64, KernelError> {
        let local = self.index_queue.deque()?;
        let mut offsets = self.offset_queue.alloc()?;
        offsets.set_len(local.len())?;
        let first = self.assignment.offset + i * self.assignment.tile_elements;
        let layout = self.layout;
        for (j, (dst, &index)) in offsets
            .as_mut_slice()
            .iter_mut()
            .zip(local.as_slice())
            .enumerate()
        {
            let position = first + j as u64;
            let index: i64 = index.into();
            if index < 0 || index as u64 >= layout.axis_length {
                return Err(KernelError::IndexOutOfRange {
                    position,
                    index,
                    bound: layout.axis_length,
                });
            }
            let batch = position / layout.indices_length;
            *dst = batch * layout.batch_length + index as u64 * layout.slice_length;
        }
        let n = local.len() as u64;
        self.offset_queue.enque(offsets);
        self.index_queue.free(local);
        Ok(n)
    }

    fn copy_out(&mut self, i: u64) -> Result<u64, KernelError> {
        let offsets = self.offset_queue.deque()?;
        let slice = self.layout.slice_length as usize;
        let base = (i * self.assignment.tile_elements) as usize * slice;
        for (j, &src) in offsets.as_slice().iter().enumerate() {
            let src = src as usize;
            let dst = base + j * slice;
            self.output[dst..dst + slice].copy_from_slice(&self.source[src..src + slice]);
        }
        let n = offsets.len() as u64;
        self.offset_queue.free(offsets);
        Ok(n)
    }
}

/// Runs one core of a gather.
///
/// `output` holds this core's index positions times `slice_length` elements.
pub fn run_gather_core<T, I>(
    ctx: CoreContext,
    plan: &TilingPlan,
    layout: &GatherLayout,
    source: &[T],
    indices: &[I],
    output: &mut [T],
    trace: bool,
) -> Result<CoreReport, KernelError>
where
    T: Copy,
    I: GatherIndex,
{
    let total = plan.total_elements;
    check_gather(layout, source, indices, total)?;
    let assignment = plan.assignment(ctx.block_idx());
    let expected = assignment.valid_elements(total) * layout.slice_length;
    if output.len() as u64 != expected {
        return Err(KernelError::LengthMismatch {
            name: format!("{ctx} output"),
            expected,
            actual: output.len() as u64,
        });
    }
    let tile = plan.tile_elements as usize;
    let mut core = GatherCore {
        assignment,
        total,
        layout: *layout,
        source,
        indices,
        output,
        index_queue: PipelineQueue::double_buffered(tile),
        offset_queue: PipelineQueue::double_buffered(tile),
    };
    run_pipeline(ctx, &assignment, total, &mut core, trace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ubflow_tiling::{HardwareSpec, TilingRequest, plan};

    fn layout() -> GatherLayout {
        // Source [4, 3]: four rows of three, gathered along axis 0.
        GatherLayout {
            batch_length: 12,
            indices_length: 5,
            slice_length: 3,
            axis_length: 4,
        }
    }

    fn one_core_plan(total: u64) -> TilingPlan {
        plan(&TilingRequest::new(total, 4, 2), &HardwareSpec::default()).unwrap()
    }

    #[test]
    fn gathers_rows() {
        let source: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let indices = [3i32, 0, 0, 2, 1];
        let p = one_core_plan(5);
        let ctx = CoreContext::new(0, 1).unwrap();
        let mut out = vec![0.0; 15];
        run_gather_core(ctx, &p, &layout(), &source, &indices, &mut out, false).unwrap();
        assert_eq!(
            out,
            vec![9.0, 10.0, 11.0, 0.0, 1.0, 2.0, 0.0, 1.0, 2.0, 6.0, 7.0, 8.0, 3.0, 4.0, 5.0]
        );
    }

    #[test]
    fn out_of_range_index_aborts() {
        let source = vec![0u8; 12];
        let indices = [0i64, 4, 0, 0, 0];
        let ctx = CoreContext::new(0, 1).unwrap();
        let mut out = vec![0; 15];
        let p = one_core_plan(5);
        let err =
            run_gather_core(ctx, &p, &layout(), &source, &indices, &mut out, false).unwrap_err();
        assert_eq!(
            err,
            KernelError::IndexOutOfRange {
                position: 1,
                index: 4,
                bound: 4
            }
        );
    }

    #[test]
    fn negative_index_aborts() {
        let source = vec![0u8; 12];
        let indices = [-1i32, 0, 0, 0, 0];
        let ctx = CoreContext::new(0, 1).unwrap();
        let mut out = vec![0; 15];
        let p = one_core_plan(5);
        assert!(matches!(
            run_gather_core(ctx, &p, &layout(), &source, &indices, &mut out, false),
            Err(KernelError::IndexOutOfRange { index: -1, .. })
        ));
    }

    #[test]
    fn source_length_checked() {
        let source = vec![0u8; 11];
        let indices = [0i32; 5];
        assert!(matches!(
            check_gather(&layout(), &source, &indices, 5),
            Err(KernelError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn layout_wider_than_batch_rejected() {
        // Four slices of three do not fit a 10-element batch.
        let wide = GatherLayout {
            batch_length: 10,
            indices_length: 5,
            ..layout()
        };
        let source = vec![0u8; 10];
        let indices = [3i32; 5];
        assert_eq!(
            check_gather(&wide, &source, &indices, 5),
            Err(KernelError::LengthMismatch {
                name: "batch".to_string(),
                expected: 12,
                actual: 10
            })
        );

        let overflow = GatherLayout {
            axis_length: u64::MAX,
            ..layout()
        };
        assert!(check_gather(&overflow, &[0u8; 12], &indices, 5).is_err());
    }
}
