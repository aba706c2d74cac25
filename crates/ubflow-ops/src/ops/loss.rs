//! Mean squared error loss.

use ubflow_ir::{DataType, Shape, TensorDescriptor};
use ubflow_kernel::{
    Element, ElementwiseKernel, LaunchOptions, Operand, ReduceKernel, Reduction, RoundMode,
    ScratchBuffer, WorkingPrecision, launch_reduce,
};
use ubflow_tiling::{HardwareSpec, TilingPlan};

use super::run_elementwise;
use crate::operator::{check_dtype, check_same, dispatch, expect_inputs, plan_stream, typed};
use crate::{Attrs, Execution, HostTensor, OpError, Operator, Storage};

const PRECISION: WorkingPrecision = WorkingPrecision::new(RoundMode::Rint);

/// The `reduction` attribute; `None` keeps one loss per element.
fn reduction(attrs: &Attrs) -> Result<Option<Reduction>, OpError> {
    match attrs.str_or("reduction", "mean")? {
        "mean" => Ok(Some(Reduction::Mean)),
        "sum" => Ok(Some(Reduction::Sum)),
        "none" => Ok(None),
        other => Err(OpError::invalid_attr(
            "reduction",
            format!("expected mean, sum or none, got \"{other}\""),
        )),
    }
}

struct SquaredError;

impl<T: Element> ElementwiseKernel<T> for SquaredError {
    fn arity(&self) -> usize {
        2
    }

    fn scratch_lanes(&self) -> usize {
        2
    }

    fn compute(&self, inputs: &[&[T]], output: &mut [T], scratch: &mut ScratchBuffer) {
        PRECISION.map_binary(inputs[0], inputs[1], output, scratch, |p, l| {
            (p - l) * (p - l)
        });
    }
}

impl<T: Element> ReduceKernel<T> for SquaredError {
    fn arity(&self) -> usize {
        2
    }

    fn scratch_lanes(&self) -> usize {
        2
    }

    fn partial(&self, inputs: &[&[T]], scratch: &mut ScratchBuffer) -> f32 {
        let (p, l) = scratch.get2(inputs[0].len());
        WorkingPrecision::upcast(inputs[0], p);
        WorkingPrecision::upcast(inputs[1], l);
        p.iter().zip(l.iter()).map(|(a, b)| (a - b) * (a - b)).sum()
    }
}

fn reduce<T: Storage + Element>(
    blob: &[u8],
    predict: &[T],
    label: &[T],
    reduction: Reduction,
    out: &TensorDescriptor,
    options: &LaunchOptions,
) -> Result<Execution, OpError> {
    let cores = TilingPlan::from_bytes(blob)?.core_count as usize;
    let mut workspace = vec![0.0f32; cores];
    let result = launch_reduce(
        blob,
        &SquaredError,
        &[predict, label],
        reduction,
        &mut workspace,
        options,
    )?;
    log::debug!("mse_loss {reduction}: {}", result.value);
    let value = T::from_f32(result.value, PRECISION.round);
    Ok(Execution {
        outputs: vec![HostTensor::from_shape_vec(out.shape().clone(), vec![value])?],
        report: result.report,
    })
}

/// Mean squared error between `predict` and `label`.
///
/// The `reduction` attribute selects `mean` (default), `sum` or `none`.
/// Reduced results are accumulated in `f32`, one partial per core.
#[derive(Debug, Clone, Copy, Default)]
pub struct MseLoss;

impl Operator for MseLoss {
    fn name(&self) -> &'static str {
        "mse_loss"
    }

    fn supported_dtypes(&self, _hw: &HardwareSpec) -> Vec<DataType> {
        vec![DataType::F16, DataType::F32]
    }

    fn infer(
        &self,
        inputs: &[TensorDescriptor],
        attrs: &Attrs,
    ) -> Result<Vec<TensorDescriptor>, OpError> {
        expect_inputs(self.name(), inputs, 2)?;
        check_same(self.name(), &inputs[0], &inputs[1])?;
        let out = match reduction(attrs)? {
            None => inputs[0].clone(),
            Some(_) => TensorDescriptor::new(Shape::scalar(), inputs[0].dtype())?,
        };
        Ok(vec![out])
    }

    fn tiling(
        &self,
        inputs: &[TensorDescriptor],
        attrs: &Attrs,
        hw: &HardwareSpec,
    ) -> Result<TilingPlan, OpError> {
        self.infer(inputs, attrs)?;
        check_dtype(self, inputs[0].dtype(), hw)?;
        plan_stream(&inputs[0], 3, Default::default(), hw)
    }

    fn execute(
        &self,
        blob: &[u8],
        inputs: &[HostTensor],
        outputs: &[TensorDescriptor],
        attrs: &Attrs,
        options: &LaunchOptions,
    ) -> Result<Execution, OpError> {
        expect_inputs(self.name(), inputs, 2)?;
        expect_inputs(self.name(), outputs, 1)?;
        let mode = reduction(attrs)?;
        dispatch!(self.name(), inputs[0], [F16, F32], |p| {
            let l = typed(self.name(), &inputs[1])?;
            match mode {
                Some(r) => reduce(blob, p.as_slice(), l, r, &outputs[0], options),
                None => run_elementwise(
                    blob,
                    &SquaredError,
                    &[Operand::Tensor(p.as_slice()), Operand::Tensor(l)],
                    &outputs[0],
                    options,
                ),
            }
        })
    }
}
