//! Multi-input pointwise operators: `heaviside`, `addcdiv`, `addcmul` and
//! `lerp`.

use ubflow_ir::{DataType, Shape, TensorDescriptor};
use ubflow_kernel::{
    Element, ElementwiseKernel, LaunchOptions, Operand, RoundMode, ScratchBuffer, WorkingPrecision,
};
use ubflow_tiling::{HardwareSpec, TilingPlan};

use super::{broadcast, expand, run_elementwise};
use crate::operator::{
    check_dtype, check_same, dispatch, expect_inputs, for_target, plan_stream, typed,
};
use crate::{Attrs, Execution, HostTensor, OpError, Operator};

const PRECISION: WorkingPrecision = WorkingPrecision::new(RoundMode::Rint);

/// Checks that `other` has the type of `first` and a shape that broadcasts
/// to it. A single element always does.
fn check_broadcast(
    op: &str,
    first: &TensorDescriptor,
    other: &TensorDescriptor,
) -> Result<(), OpError> {
    if other.dtype() == first.dtype()
        && (other.element_count() == 1 || other.shape().broadcasts_to(first.shape()))
    {
        return Ok(());
    }
    check_same(op, first, other)
}

/// Step function of `x`, with `values` at zero.
fn step(x: f32, at_zero: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        0.0
    } else if x == 0.0 {
        at_zero
    } else {
        0.0
    }
}

struct HeavisideKernel;

impl<T: Element> ElementwiseKernel<T> for HeavisideKernel {
    fn arity(&self) -> usize {
        2
    }

    fn scratch_lanes(&self) -> usize {
        2
    }

    fn compute(&self, inputs: &[&[T]], output: &mut [T], scratch: &mut ScratchBuffer) {
        PRECISION.map_binary(inputs[0], inputs[1], output, scratch, step);
    }
}

/// Heaviside step function.
///
/// Inputs are `x` and `values`, the result where `x` is zero. `values` is
/// broadcast to the shape of `x`. NaN inputs give 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct Heaviside;

impl Operator for Heaviside {
    fn name(&self) -> &'static str {
        "heaviside"
    }

    fn supported_dtypes(&self, _hw: &HardwareSpec) -> Vec<DataType> {
        vec![DataType::F16, DataType::F32]
    }

    fn infer(
        &self,
        inputs: &[TensorDescriptor],
        _attrs: &Attrs,
    ) -> Result<Vec<TensorDescriptor>, OpError> {
        expect_inputs(self.name(), inputs, 2)?;
        check_broadcast(self.name(), &inputs[0], &inputs[1])?;
        Ok(vec![inputs[0].clone()])
    }

    fn tiling(
        &self,
        inputs: &[TensorDescriptor],
        attrs: &Attrs,
        hw: &HardwareSpec,
    ) -> Result<TilingPlan, OpError> {
        self.infer(inputs, attrs)?;
        check_dtype(self, inputs[0].dtype(), hw)?;
        plan_stream(&inputs[0], 4, Default::default(), hw)
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
        check_broadcast(self.name(), inputs[0].desc(), inputs[1].desc())?;
        let total = outputs[0].element_count();
        dispatch!(self.name(), inputs[0], [F16, F32], |x| {
            let values = typed(self.name(), &inputs[1])?;
            let values = expand(values, inputs[1].shape(), inputs[0].shape());
            run_elementwise(
                blob,
                &HeavisideKernel,
                &[Operand::Tensor(x.as_slice()), broadcast(&values, total)],
                &outputs[0],
                options,
            )
        })
    }
}

/// `input + value * combine(x1, x2)` in the working precision.
struct AddcKernel {
    value: f32,
    combine: fn(f32, f32) -> f32,
}

impl<T: Element> ElementwiseKernel<T> for AddcKernel {
    fn arity(&self) -> usize {
        3
    }

    fn scratch_lanes(&self) -> usize {
        3
    }

    fn compute(&self, inputs: &[&[T]], output: &mut [T], scratch: &mut ScratchBuffer) {
        let (value, combine) = (self.value, self.combine);
        PRECISION.map_ternary(
            inputs[0],
            inputs[1],
            inputs[2],
            output,
            scratch,
            |x, a, b| x + value * combine(a, b),
        );
    }
}

fn addc_dtypes(hw: &HardwareSpec) -> Vec<DataType> {
    for_target(&[DataType::F16, DataType::F32, DataType::BF16], hw)
}

/// `input`, `x1` and `x2` of one shape, then a one-element `value`.
fn infer_addc(op: &str, inputs: &[TensorDescriptor]) -> Result<Vec<TensorDescriptor>, OpError> {
    expect_inputs(op, inputs, 4)?;
    let input = &inputs[0];
    check_same(op, input, &inputs[1])?;
    check_same(op, input, &inputs[2])?;
    let value = &inputs[3];
    if value.element_count() != 1 {
        return Err(OpError::ShapeMismatch {
            op: op.to_string(),
            expected: Shape::scalar(),
            actual: value.shape().clone(),
        });
    }
    if value.dtype() != input.dtype() {
        return Err(OpError::DtypeMismatch {
            op: op.to_string(),
            expected: input.dtype(),
            actual: value.dtype(),
        });
    }
    Ok(vec![input.clone()])
}

fn tiling_addc(
    op: &dyn Operator,
    inputs: &[TensorDescriptor],
    hw: &HardwareSpec,
) -> Result<TilingPlan, OpError> {
    infer_addc(op.name(), inputs)?;
    let input = &inputs[0];
    check_dtype(op, input.dtype(), hw)?;
    let live = if input.dtype() == DataType::F32 { 6 } else { 12 };
    plan_stream(input, live, Default::default(), hw)
}

fn execute_addc(
    op: &str,
    combine: fn(f32, f32) -> f32,
    blob: &[u8],
    inputs: &[HostTensor],
    outputs: &[TensorDescriptor],
    options: &LaunchOptions,
) -> Result<Execution, OpError> {
    expect_inputs(op, inputs, 4)?;
    expect_inputs(op, outputs, 1)?;
    // The value is read on the host; it never travels in the plan.
    let value = inputs[3]
        .to_f64_vec()
        .first()
        .copied()
        .ok_or_else(|| OpError::ShapeMismatch {
            op: op.to_string(),
            expected: Shape::scalar(),
            actual: inputs[3].shape().clone(),
        })? as f32;
    let kernel = AddcKernel { value, combine };
    dispatch!(op, inputs[0], [F16, F32, BF16], |x| {
        let x1 = typed(op, &inputs[1])?;
        let x2 = typed(op, &inputs[2])?;
        run_elementwise(
            blob,
            &kernel,
            &[
                Operand::Tensor(x.as_slice()),
                Operand::Tensor(x1),
                Operand::Tensor(x2),
            ],
            &outputs[0],
            options,
        )
    })
}

/// `input + value * x1 / x2`.
///
/// Inputs are `input`, `x1`, `x2` (all the same shape) and a one-element
/// `value` tensor of the same type.
#[derive(Debug, Clone, Copy, Default)]
pub struct Addcdiv;

impl Operator for Addcdiv {
    fn name(&self) -> &'static str {
        "addcdiv"
    }

    fn supported_dtypes(&self, hw: &HardwareSpec) -> Vec<DataType> {
        addc_dtypes(hw)
    }

    fn infer(
        &self,
        inputs: &[TensorDescriptor],
        _attrs: &Attrs,
    ) -> Result<Vec<TensorDescriptor>, OpError> {
        infer_addc(self.name(), inputs)
    }

    fn tiling(
        &self,
        inputs: &[TensorDescriptor],
        _attrs: &Attrs,
        hw: &HardwareSpec,
    ) -> Result<TilingPlan, OpError> {
        tiling_addc(self, inputs, hw)
    }

    fn execute(
        &self,
        blob: &[u8],
        inputs: &[HostTensor],
        outputs: &[TensorDescriptor],
        _attrs: &Attrs,
        options: &LaunchOptions,
    ) -> Result<Execution, OpError> {
        execute_addc(self.name(), |a, b| a / b, blob, inputs, outputs, options)
    }
}

/// `input + value * x1 * x2`, with the inputs of [`Addcdiv`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Addcmul;

impl Operator for Addcmul {
    fn name(&self) -> &'static str {
        "addcmul"
    }

    fn supported_dtypes(&self, hw: &HardwareSpec) -> Vec<DataType> {
        addc_dtypes(hw)
    }

    fn infer(
        &self,
        inputs: &[TensorDescriptor],
        _attrs: &Attrs,
    ) -> Result<Vec<TensorDescriptor>, OpError> {
        infer_addc(self.name(), inputs)
    }

    fn tiling(
        &self,
        inputs: &[TensorDescriptor],
        _attrs: &Attrs,
        hw: &HardwareSpec,
    ) -> Result<TilingPlan, OpError> {
        tiling_addc(self, inputs, hw)
    }

    fn execute(
        &self,
        blob: &[u8],
        inputs: &[HostTensor],
        outputs: &[TensorDescriptor],
        _attrs: &Attrs,
        options: &LaunchOptions,
    ) -> Result<Execution, OpError> {
        execute_addc(self.name(), |a, b| a * b, blob, inputs, outputs, options)
    }
}

struct LerpKernel;

impl<T: Element> ElementwiseKernel<T> for LerpKernel {
    fn arity(&self) -> usize {
        3
    }

    fn scratch_lanes(&self) -> usize {
        3
    }

    fn compute(&self, inputs: &[&[T]], output: &mut [T], scratch: &mut ScratchBuffer) {
        PRECISION.map_ternary(
            inputs[0],
            inputs[1],
            inputs[2],
            output,
            scratch,
            |start, end, weight| start + weight * (end - start),
        );
    }
}

/// Linear interpolation `start + weight * (end - start)`.
///
/// `start` and `end` share a shape; `weight` broadcasts to it. Half inputs
/// are computed in `f32`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lerp;

impl Operator for Lerp {
    fn name(&self) -> &'static str {
        "lerp"
    }

    fn supported_dtypes(&self, _hw: &HardwareSpec) -> Vec<DataType> {
        vec![DataType::F16, DataType::F32]
    }

    fn infer(
        &self,
        inputs: &[TensorDescriptor],
        _attrs: &Attrs,
    ) -> Result<Vec<TensorDescriptor>, OpError> {
        expect_inputs(self.name(), inputs, 3)?;
        check_same(self.name(), &inputs[0], &inputs[1])?;
        check_broadcast(self.name(), &inputs[0], &inputs[2])?;
        Ok(vec![inputs[0].clone()])
    }

    fn tiling(
        &self,
        inputs: &[TensorDescriptor],
        attrs: &Attrs,
        hw: &HardwareSpec,
    ) -> Result<TilingPlan, OpError> {
        self.infer(inputs, attrs)?;
        check_dtype(self, inputs[0].dtype(), hw)?;
        plan_stream(&inputs[0], 12, Default::default(), hw)
    }

    fn execute(
        &self,
        blob: &[u8],
        inputs: &[HostTensor],
        outputs: &[TensorDescriptor],
        _attrs: &Attrs,
        options: &LaunchOptions,
    ) -> Result<Execution, OpError> {
        expect_inputs(self.name(), inputs, 3)?;
        expect_inputs(self.name(), outputs, 1)?;
        check_broadcast(self.name(), inputs[0].desc(), inputs[2].desc())?;
        let total = outputs[0].element_count();
        dispatch!(self.name(), inputs[0], [F16, F32], |start| {
            let end = typed(self.name(), &inputs[1])?;
            let weight = typed(self.name(), &inputs[2])?;
            let weight = expand(weight, inputs[2].shape(), inputs[0].shape());
            run_elementwise(
                blob,
                &LerpKernel,
                &[
                    Operand::Tensor(start.as_slice()),
                    Operand::Tensor(end),
                    broadcast(&weight, total),
                ],
                &outputs[0],
                options,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use half::{bf16, f16};

    use super::*;
    use crate::ops::testing::{assert_close, run, values};

    #[test]
    fn heaviside_with_tensor_values() {
        let x = HostTensor::from_vec(vec![-2.0f32, 0.0, 3.0, 0.0]);
        let v = HostTensor::from_vec(vec![9.0f32, 0.5, 9.0, 0.25]);
        let out = run(&Heaviside, &[x, v], &Attrs::new()).unwrap();
        assert_eq!(values(&out), vec![0.0, 0.5, 1.0, 0.25]);
    }

    #[test]
    fn heaviside_broadcasts_single_value() {
        let xs: Vec<f16> = [-1.0, 0.0, -0.0, 2.0, f32::NAN]
            .iter()
            .map(|&v| f16::from_f32(v))
            .collect();
        let x = HostTensor::from_vec(xs);
        let v = HostTensor::from_vec(vec![f16::from_f32(0.5)]);
        let out = run(&Heaviside, &[x, v], &Attrs::new()).unwrap();
        let got = values(&out);
        assert_eq!(got, vec![0.0, 0.5, 0.5, 1.0, 0.0]);
    }

    #[test]
    fn heaviside_broadcasts_row_of_values() {
        let x = HostTensor::from_shape_vec(
            Shape::new(vec![2, 3]).unwrap(),
            vec![0.0f32, 0.0, 0.0, 0.0, -1.0, 0.0],
        )
        .unwrap();
        let v = HostTensor::from_vec(vec![0.25f32, 0.5, 0.75]);
        let out = run(&Heaviside, &[x, v], &Attrs::new()).unwrap();
        assert_eq!(out.outputs[0].shape().dims(), &[2, 3]);
        assert_eq!(values(&out), vec![0.25, 0.5, 0.75, 0.25, 0.0, 0.75]);
    }

    #[test]
    fn heaviside_rejects_partial_values() {
        let x = TensorDescriptor::vector(4, DataType::F32);
        let v = TensorDescriptor::vector(2, DataType::F32);
        let err = Heaviside.infer(&[x, v], &Attrs::new()).unwrap_err();
        assert!(matches!(err, OpError::ShapeMismatch { .. }));
    }

    #[test]
    fn addcdiv_matches_reference() {
        let n = 500;
        let input: Vec<f32> = (0..n).map(|i| i as f32 * 0.01).collect();
        let x1: Vec<f32> = (0..n).map(|i| (i % 7) as f32 - 3.0).collect();
        let x2: Vec<f32> = (0..n).map(|i| 1.0 + (i % 5) as f32).collect();
        let expected: Vec<f32> = (0..n).map(|i| input[i] + 0.5 * x1[i] / x2[i]).collect();
        let inputs = [
            HostTensor::from_vec(input),
            HostTensor::from_vec(x1),
            HostTensor::from_vec(x2),
            HostTensor::from_shape_vec(Shape::scalar(), vec![0.5f32]).unwrap(),
        ];
        let out = run(&Addcdiv, &inputs, &Attrs::new()).unwrap();
        assert_close(&values(&out), &expected, 1e-6);
    }

    #[test]
    fn addcdiv_value_must_be_single() {
        let d = TensorDescriptor::vector(4, DataType::F32);
        let err = Addcdiv
            .infer(&[d.clone(), d.clone(), d.clone(), d], &Attrs::new())
            .unwrap_err();
        assert!(matches!(err, OpError::ShapeMismatch { .. }));
    }

    #[test]
    fn addcmul_matches_reference() {
        let n = 300;
        let input: Vec<f32> = (0..n).map(|i| i as f32 * 0.5).collect();
        let x1: Vec<f32> = (0..n).map(|i| (i % 9) as f32 - 4.0).collect();
        let x2: Vec<f32> = (0..n).map(|i| 0.25 * (i % 4) as f32).collect();
        let expected: Vec<f32> = (0..n).map(|i| input[i] - 2.0 * x1[i] * x2[i]).collect();
        let inputs = [
            HostTensor::from_vec(input),
            HostTensor::from_vec(x1),
            HostTensor::from_vec(x2),
            HostTensor::from_vec(vec![-2.0f32]),
        ];
        let out = run(&Addcmul, &inputs, &Attrs::new()).unwrap();
        assert_close(&values(&out), &expected, 1e-6);
    }

    #[test]
    fn addcmul_bf16_rounds_once() {
        let bf = |v: &[f32]| HostTensor::from_vec(v.iter().map(|&x| bf16::from_f32(x)).collect::<Vec<_>>());
        let inputs = [
            bf(&[1.0, 256.0]),
            bf(&[3.0, 1.0]),
            bf(&[0.5, 1.0]),
            bf(&[1.0]),
        ];
        let out = run(&Addcmul, &inputs, &Attrs::new()).unwrap();
        // 256 + 1 is not representable in bf16 and rounds to even.
        assert_eq!(
            out.outputs[0].as_slice::<bf16>().unwrap(),
            &[bf16::from_f32(2.5), bf16::from_f32(256.0)]
        );
    }

    #[test]
    fn lerp_with_tensor_and_scalar_weight() {
        let start = HostTensor::from_vec(vec![0.0f32, 10.0, -4.0, 1.0]);
        let end = HostTensor::from_vec(vec![1.0f32, 20.0, 4.0, 1.0]);
        let w = HostTensor::from_vec(vec![0.5f32, 0.25, 1.0, 3.0]);
        let out = run(&Lerp, &[start.clone(), end.clone(), w], &Attrs::new()).unwrap();
        assert_eq!(values(&out), vec![0.5, 12.5, 4.0, 1.0]);

        let w = HostTensor::from_shape_vec(Shape::scalar(), vec![0.75f32]).unwrap();
        let out = run(&Lerp, &[start, end, w], &Attrs::new()).unwrap();
        assert_eq!(values(&out), vec![0.75, 17.5, 2.0, 1.0]);
    }

    #[test]
    fn lerp_half_weight_row() {
        let h = |v: &[f32]| v.iter().map(|&x| f16::from_f32(x)).collect::<Vec<_>>();
        let shape = Shape::new(vec![2, 2]).unwrap();
        let start = HostTensor::from_shape_vec(shape.clone(), h(&[0.0, 0.0, 2.0, 2.0])).unwrap();
        let end = HostTensor::from_shape_vec(shape, h(&[4.0, 4.0, 6.0, 6.0])).unwrap();
        let w = HostTensor::from_vec(h(&[0.25, 0.5]));
        let out = run(&Lerp, &[start, end, w], &Attrs::new()).unwrap();
        assert_eq!(values(&out), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn lerp_rejects_mismatched_ends() {
        let a = TensorDescriptor::vector(4, DataType::F32);
        let b = TensorDescriptor::vector(3, DataType::F32);
        let err = Lerp.infer(&[a.clone(), b, a.clone()], &Attrs::new()).unwrap_err();
        assert!(matches!(err, OpError::ShapeMismatch { .. }));
        let w = TensorDescriptor::vector(4, DataType::F16);
        let err = Lerp.infer(&[a.clone(), a, w], &Attrs::new()).unwrap_err();
        assert!(matches!(err, OpError::DtypeMismatch { .. }));
    }

    #[test]
    fn addcdiv_live_buffers() {
        let hw = HardwareSpec::default().with_core_count(1).with_ub_bytes(3072);
        let tile = |dtype| {
            let d = TensorDescriptor::vector(8192, dtype);
            let v = TensorDescriptor::vector(1, dtype);
            Addcdiv
                .tiling(&[d.clone(), d.clone(), d, v], &Attrs::new(), &hw)
                .unwrap()
                .tile_elements
        };
        // 3072 / 6 / 2 = 256 bytes; 3072 / 12 / 2 = 128 bytes.
        assert_eq!(tile(DataType::F32), 64);
        assert_eq!(tile(DataType::F16), 64);

        let d = TensorDescriptor::vector(8192, DataType::F32);
        let plan = Lerp
            .tiling(&[d.clone(), d.clone(), d], &Attrs::new(), &hw)
            .unwrap();
        assert_eq!(plan.tile_elements, 32);
    }
}
