//! Logical operators over `i8` and `bool`.
//!
//! Inputs are truth values: any nonzero element is true. Results are always
//! `0` or `1` in the input type. The arithmetic runs on widened values, where
//! `0` and `1` are exact.

use ubflow_ir::{DataType, TensorDescriptor};
use ubflow_kernel::{
    Element, ElementwiseKernel, LaunchOptions, Operand, RoundMode, ScratchBuffer, WorkingPrecision,
};
use ubflow_tiling::{HardwareSpec, TilingPlan};

use super::run_elementwise;
use crate::operator::{check_dtype, check_same, dispatch, expect_inputs, plan_stream};
use crate::{Attrs, Execution, HostTensor, OpError, Operator};

const TRUTH: &[DataType] = &[DataType::I8, DataType::Bool];

const WIDEN: WorkingPrecision = WorkingPrecision::new(RoundMode::Rint);

/// `min(|x|, 1)`: the truth value of `x` as `0.0` or `1.0`.
fn truth(x: f32) -> f32 {
    x.abs().min(1.0)
}

struct NotKernel;

impl<T: Element> ElementwiseKernel<T> for NotKernel {
    fn arity(&self) -> usize {
        1
    }

    fn scratch_lanes(&self) -> usize {
        1
    }

    fn compute(&self, inputs: &[&[T]], output: &mut [T], scratch: &mut ScratchBuffer) {
        WIDEN.map_unary(inputs[0], output, scratch, |x| (truth(x) - 1.0).abs());
    }
}

struct OrKernel;

impl<T: Element> ElementwiseKernel<T> for OrKernel {
    fn arity(&self) -> usize {
        2
    }

    fn scratch_lanes(&self) -> usize {
        2
    }

    fn compute(&self, inputs: &[&[T]], output: &mut [T], scratch: &mut ScratchBuffer) {
        WIDEN.map_binary(inputs[0], inputs[1], output, scratch, |a, b| {
            truth(a.abs().max(b.abs()))
        });
    }
}

/// Elementwise logical negation.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogicalNot;

impl Operator for LogicalNot {
    fn name(&self) -> &'static str {
        "logical_not"
    }

    fn supported_dtypes(&self, _hw: &HardwareSpec) -> Vec<DataType> {
        TRUTH.to_vec()
    }

    fn infer(
        &self,
        inputs: &[TensorDescriptor],
        _attrs: &Attrs,
    ) -> Result<Vec<TensorDescriptor>, OpError> {
        expect_inputs(self.name(), inputs, 1)?;
        Ok(vec![inputs[0].clone()])
    }

    fn tiling(
        &self,
        inputs: &[TensorDescriptor],
        _attrs: &Attrs,
        hw: &HardwareSpec,
    ) -> Result<TilingPlan, OpError> {
        expect_inputs(self.name(), inputs, 1)?;
        check_dtype(self, inputs[0].dtype(), hw)?;
        plan_stream(&inputs[0], 3, Default::default(), hw)
    }

    fn execute(
        &self,
        blob: &[u8],
        inputs: &[HostTensor],
        outputs: &[TensorDescriptor],
        _attrs: &Attrs,
        options: &LaunchOptions,
    ) -> Result<Execution, OpError> {
        expect_inputs(self.name(), inputs, 1)?;
        expect_inputs(self.name(), outputs, 1)?;
        dispatch!(self.name(), inputs[0], [I8, Bool], |x| {
            run_elementwise(
                blob,
                &NotKernel,
                &[Operand::Tensor(x.as_slice())],
                &outputs[0],
                options,
            )
        })
    }
}

/// Elementwise logical disjunction of two same-shaped tensors.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogicalOr;

impl Operator for LogicalOr {
    fn name(&self) -> &'static str {
        "logical_or"
    }

    fn supported_dtypes(&self, _hw: &HardwareSpec) -> Vec<DataType> {
        TRUTH.to_vec()
    }

    fn infer(
        &self,
        inputs: &[TensorDescriptor],
        _attrs: &Attrs,
    ) -> Result<Vec<TensorDescriptor>, OpError> {
        expect_inputs(self.name(), inputs, 2)?;
        check_same(self.name(), &inputs[0], &inputs[1])?;
        Ok(vec![inputs[0].clone()])
    }

    fn tiling(
        &self,
        inputs: &[TensorDescriptor],
        _attrs: &Attrs,
        hw: &HardwareSpec,
    ) -> Result<TilingPlan, OpError> {
        expect_inputs(self.name(), inputs, 2)?;
        check_dtype(self, inputs[0].dtype(), hw)?;
        check_same(self.name(), &inputs[0], &inputs[1])?;
        plan_stream(&inputs[0], 5, Default::default(), hw)
    }

    fn execute(
        &self,
        blob: &[u8],
        inputs: &[HostTensor],
        outputs: &[TensorDescriptor],
        _attrs: &Attrs,
        options: &LaunchOptions,
    ) -> Result<Execution, OpError> {
        expect_inputs(self.name(), inputs, 2)?;
        expect_inputs(self.name(), outputs, 1)?;
        let (a, b) = (&inputs[0], &inputs[1]);
        dispatch!(self.name(), a, [I8, Bool], |x| {
            let y = crate::operator::typed(self.name(), b)?;
            run_elementwise(
                blob,
                &OrKernel,
                &[Operand::Tensor(x.as_slice()), Operand::Tensor(y)],
                &outputs[0],
                options,
            )
        })
    }
}
