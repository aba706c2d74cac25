//! Operators on one input and attribute scalars: `abs`, `neg`, `muls` and
//! `clip_by_value`. Integer and sign-bit paths compute in the input's own
//! type.

use half::{bf16, f16};
use ubflow_ir::{Complex, DataType, TensorDescriptor};
use ubflow_kernel::{
    Element, ElementwiseKernel, LaunchOptions, Operand, RoundMode, ScratchBuffer, WorkingPrecision,
};
use ubflow_tiling::{HardwareSpec, TilingPlan};

use super::{blob_scalars, run_elementwise};
use crate::operator::{check_dtype, dispatch, expect_inputs, for_target, plan_stream};
use crate::{Attrs, Execution, HostTensor, OpError, Operator};

/// Sign manipulation on the raw representation.
trait Signed: Copy + Send + Sync {
    fn magnitude(self) -> Self;
    fn negate(self) -> Self;
}

impl Signed for f32 {
    fn magnitude(self) -> Self {
        self.abs()
    }

    fn negate(self) -> Self {
        -self
    }
}

impl Signed for i32 {
    fn magnitude(self) -> Self {
        self.wrapping_abs()
    }

    fn negate(self) -> Self {
        self.wrapping_neg()
    }
}

macro_rules! signed_half {
    ($($ty:ty),*) => {$(
        impl Signed for $ty {
            fn magnitude(self) -> Self {
                <$ty>::from_bits(self.to_bits() & 0x7fff)
            }

            fn negate(self) -> Self {
                <$ty>::from_bits(self.to_bits() ^ 0x8000)
            }
        }
    )*};
}

signed_half!(f16, bf16);

struct SignKernel {
    negate: bool,
}

impl<T: Signed> ElementwiseKernel<T> for SignKernel {
    fn arity(&self) -> usize {
        1
    }

    fn compute(&self, inputs: &[&[T]], output: &mut [T], _scratch: &mut ScratchBuffer) {
        let f = if self.negate { T::negate } else { T::magnitude };
        for (y, &x) in output.iter_mut().zip(inputs[0]) {
            *y = f(x);
        }
    }
}

/// `|x|` or `-x`.
#[derive(Debug, Clone, Copy)]
pub struct Sign {
    name: &'static str,
    negate: bool,
}

impl Sign {
    pub const fn abs() -> Self {
        Self {
            name: "abs",
            negate: false,
        }
    }

    pub const fn neg() -> Self {
        Self {
            name: "neg",
            negate: true,
        }
    }
}

impl Operator for Sign {
    fn name(&self) -> &'static str {
        self.name
    }

    fn supported_dtypes(&self, hw: &HardwareSpec) -> Vec<DataType> {
        for_target(
            &[DataType::F16, DataType::F32, DataType::BF16, DataType::I32],
            hw,
        )
    }

    fn infer(
        &self,
        inputs: &[TensorDescriptor],
        _attrs: &Attrs,
    ) -> Result<Vec<TensorDescriptor>, OpError> {
        expect_inputs(self.name, inputs, 1)?;
        Ok(vec![inputs[0].clone()])
    }

    fn tiling(
        &self,
        inputs: &[TensorDescriptor],
        _attrs: &Attrs,
        hw: &HardwareSpec,
    ) -> Result<TilingPlan, OpError> {
        expect_inputs(self.name, inputs, 1)?;
        check_dtype(self, inputs[0].dtype(), hw)?;
        plan_stream(&inputs[0], 2, Default::default(), hw)
    }

    fn execute(
        &self,
        blob: &[u8],
        inputs: &[HostTensor],
        outputs: &[TensorDescriptor],
        _attrs: &Attrs,
        options: &LaunchOptions,
    ) -> Result<Execution, OpError> {
        expect_inputs(self.name, inputs, 1)?;
        expect_inputs(self.name, outputs, 1)?;
        let kernel = SignKernel {
            negate: self.negate,
        };
        dispatch!(self.name, inputs[0], [F16, F32, BF16, I32], |x| {
            run_elementwise(
                blob,
                &kernel,
                &[Operand::Tensor(x.as_slice())],
                &outputs[0],
                options,
            )
        })
    }
}

// ---------------------------------------------------------------------------
// muls
// ---------------------------------------------------------------------------

/// Integers multiplied with wraparound by a truncated scalar.
trait WrappingScale: Copy + Send + Sync {
    fn truncate(value: f32) -> Self;
    fn scale(self, by: Self) -> Self;
}

macro_rules! wrapping_scale {
    ($($ty:ty),*) => {$(
        impl WrappingScale for $ty {
            fn truncate(value: f32) -> Self {
                value as $ty
            }

            fn scale(self, by: Self) -> Self {
                self.wrapping_mul(by)
            }
        }
    )*};
}

wrapping_scale!(i16, i32, i64);

struct FloatScale {
    precision: WorkingPrecision,
    value: f32,
}

impl<T: Element> ElementwiseKernel<T> for FloatScale {
    fn arity(&self) -> usize {
        1
    }

    fn scratch_lanes(&self) -> usize {
        1
    }

    fn compute(&self, inputs: &[&[T]], output: &mut [T], scratch: &mut ScratchBuffer) {
        let value = self.value;
        self.precision
            .map_unary(inputs[0], output, scratch, |x| x * value);
    }
}

struct IntScale {
    value: f32,
}

impl<T: WrappingScale> ElementwiseKernel<T> for IntScale {
    fn arity(&self) -> usize {
        1
    }

    fn compute(&self, inputs: &[&[T]], output: &mut [T], _scratch: &mut ScratchBuffer) {
        let by = T::truncate(self.value);
        for (y, &x) in output.iter_mut().zip(inputs[0]) {
            *y = x.scale(by);
        }
    }
}

struct ComplexScale {
    value: f32,
}

impl ElementwiseKernel<Complex> for ComplexScale {
    fn arity(&self) -> usize {
        1
    }

    fn compute(&self, inputs: &[&[Complex]], output: &mut [Complex], _: &mut ScratchBuffer) {
        for (y, &x) in output.iter_mut().zip(inputs[0]) {
            *y = x.scale(self.value);
        }
    }
}

/// `x * value` for a scalar `value` attribute.
///
/// Floating-point inputs are scaled in `f32` and rounded once; integer
/// inputs wrap on overflow and use `value` truncated toward zero; complex
/// inputs scale both parts.
#[derive(Debug, Clone, Copy, Default)]
pub struct Muls;

impl Operator for Muls {
    fn name(&self) -> &'static str {
        "muls"
    }

    fn supported_dtypes(&self, hw: &HardwareSpec) -> Vec<DataType> {
        for_target(
            &[
                DataType::BF16,
                DataType::F16,
                DataType::F32,
                DataType::I16,
                DataType::I32,
                DataType::I64,
                DataType::Complex64,
            ],
            hw,
        )
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
        attrs: &Attrs,
        hw: &HardwareSpec,
    ) -> Result<TilingPlan, OpError> {
        expect_inputs(self.name(), inputs, 1)?;
        let x = &inputs[0];
        check_dtype(self, x.dtype(), hw)?;
        let value = attrs.f32_required("value")?;
        plan_stream(x, 3, [value, 0.0, 0.0, 0.0], hw)
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
        let value = blob_scalars(blob)?[0];
        let x = &inputs[0];
        let out = &outputs[0];
        match x.dtype() {
            DataType::F16 | DataType::F32 | DataType::BF16 => {
                let kernel = FloatScale {
                    precision: WorkingPrecision::new(RoundMode::Rint),
                    value,
                };
                dispatch!(self.name(), x, [F16, F32, BF16], |v| {
                    run_elementwise(blob, &kernel, &[Operand::Tensor(v.as_slice())], out, options)
                })
            }
            DataType::Complex64 => {
                let kernel = ComplexScale { value };
                dispatch!(self.name(), x, [Complex64], |v| {
                    run_elementwise(blob, &kernel, &[Operand::Tensor(v.as_slice())], out, options)
                })
            }
            _ => {
                let kernel = IntScale { value };
                dispatch!(self.name(), x, [I16, I32, I64], |v| {
                    run_elementwise(blob, &kernel, &[Operand::Tensor(v.as_slice())], out, options)
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// clip_by_value
// ---------------------------------------------------------------------------

struct FloatClip {
    precision: WorkingPrecision,
    min: f32,
    max: f32,
}

impl<T: Element> ElementwiseKernel<T> for FloatClip {
    fn arity(&self) -> usize {
        1
    }

    fn scratch_lanes(&self) -> usize {
        1
    }

    fn compute(&self, inputs: &[&[T]], output: &mut [T], scratch: &mut ScratchBuffer) {
        let (min, max) = (self.min, self.max);
        self.precision.map_unary(inputs[0], output, scratch, |x| {
            if x.is_nan() { x } else { x.max(min).min(max) }
        });
    }
}

struct IntClip {
    min: i32,
    max: i32,
}

impl ElementwiseKernel<i32> for IntClip {
    fn arity(&self) -> usize {
        1
    }

    fn compute(&self, inputs: &[&[i32]], output: &mut [i32], _scratch: &mut ScratchBuffer) {
        for (y, &x) in output.iter_mut().zip(inputs[0]) {
            *y = x.max(self.min).min(self.max);
        }
    }
}

/// `min(max(x, min), max)` for scalar `min` and `max` attributes.
///
/// The lower bound is applied first, so `min > max` yields `max`
/// everywhere. NaN stays NaN. Integer bounds are truncated toward zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClipByValue;

impl Operator for ClipByValue {
    fn name(&self) -> &'static str {
        "clip_by_value"
    }

    fn supported_dtypes(&self, hw: &HardwareSpec) -> Vec<DataType> {
        for_target(
            &[DataType::F16, DataType::F32, DataType::I32, DataType::BF16],
            hw,
        )
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
        attrs: &Attrs,
        hw: &HardwareSpec,
    ) -> Result<TilingPlan, OpError> {
        expect_inputs(self.name(), inputs, 1)?;
        let x = &inputs[0];
        check_dtype(self, x.dtype(), hw)?;
        let min = attrs.f32_required("min")?;
        let max = attrs.f32_required("max")?;
        let live = if x.dtype() == DataType::BF16 { 6 } else { 3 };
        plan_stream(x, live, [min, max, 0.0, 0.0], hw)
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
        let [min, max, ..] = blob_scalars(blob)?;
        let x = &inputs[0];
        let out = &outputs[0];
        if x.dtype() == DataType::I32 {
            let kernel = IntClip {
                min: min as i32,
                max: max as i32,
            };
            return dispatch!(self.name(), x, [I32], |v| {
                run_elementwise(blob, &kernel, &[Operand::Tensor(v.as_slice())], out, options)
            });
        }
        let kernel = FloatClip {
            precision: WorkingPrecision::new(RoundMode::Rint),
            min,
            max,
        };
        dispatch!(self.name(), x, [F16, F32, BF16], |v| {
            run_elementwise(blob, &kernel, &[Operand::Tensor(v.as_slice())], out, options)
        })
    }
}
