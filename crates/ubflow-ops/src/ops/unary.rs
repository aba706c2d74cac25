//! Single-input floating-point operators computed in `f32`.
//!
//! Each operator is a point function plus the scalars it reads from the
//! plan. `f16` and `bf16` tiles are widened to `f32`, transformed and
//! narrowed again; `f32` tiles are transformed in place.

use ubflow_ir::{DataType, TensorDescriptor};
use ubflow_kernel::{
    Element, ElementwiseKernel, LaunchOptions, Operand, RoundMode, ScratchBuffer, WorkingPrecision,
};
use ubflow_tiling::{HardwareSpec, SCALAR_SLOTS, TilingPlan};

use super::{blob_scalars, run_elementwise};
use crate::operator::{check_dtype, dispatch, expect_inputs, for_target, plan_stream};
use crate::{Attrs, Execution, HostTensor, OpError, Operator};

type Scalars = [f32; SCALAR_SLOTS];

const FLOATS: &[DataType] = &[DataType::F16, DataType::F32, DataType::BF16];

/// A unary operator over `f16`, `f32` and `bf16`.
#[derive(Debug, Clone, Copy)]
pub struct Unary {
    name: &'static str,
    live_f32: u64,
    live_f16: u64,
    live_other: u64,
    round: RoundMode,
    scalars: fn(&Attrs) -> Result<Scalars, OpError>,
    apply: fn(f32, &Scalars) -> f32,
}

fn no_scalars(_: &Attrs) -> Result<Scalars, OpError> {
    Ok([0.0; SCALAR_SLOTS])
}

/// `scale`, `shift` and `base` with their defaults.
fn affine(attrs: &Attrs) -> Result<(f32, f32, f32), OpError> {
    Ok((
        attrs.f32_or("scale", 1.0)?,
        attrs.f32_or("shift", 0.0)?,
        attrs.f32_or("base", -1.0)?,
    ))
}

fn log_scalars(attrs: &Attrs) -> Result<Scalars, OpError> {
    let (scale, shift, base) = affine(attrs)?;
    let k = if base == -1.0 {
        1.0
    } else if base > 0.0 && base != 1.0 {
        1.0 / base.ln()
    } else {
        log::warn!("log base {base} has no logarithm, using the natural base");
        1.0
    };
    Ok([scale, shift, k, 0.0])
}

fn exp_scalars(attrs: &Attrs) -> Result<Scalars, OpError> {
    let (scale, shift, base) = affine(attrs)?;
    let k = if base == -1.0 {
        1.0
    } else if base > 0.0 {
        base.ln()
    } else {
        return Err(OpError::invalid_attr(
            "base",
            format!("must be -1 or positive, got {base}"),
        ));
    };
    Ok([scale, shift, k, 0.0])
}

fn swish_scalars(attrs: &Attrs) -> Result<Scalars, OpError> {
    Ok([attrs.f32_or("scale", 1.0)?, 0.0, 0.0, 0.0])
}

impl Unary {
    const fn new(
        name: &'static str,
        live_f32: u64,
        live_other: u64,
        apply: fn(f32, &Scalars) -> f32,
    ) -> Self {
        Self {
            name,
            live_f32,
            live_f16: live_other,
            live_other,
            round: RoundMode::Rint,
            scalars: no_scalars,
            apply,
        }
    }

    /// `ln(x * scale + shift) / ln(base)`; `base = -1` is the natural log.
    ///
    /// Only `bf16` needs a third buffer for its `f32` working copy.
    pub fn log() -> Self {
        Self {
            scalars: log_scalars,
            live_f16: 2,
            ..Self::new("log", 2, 3, |x, s| (x * s[0] + s[1]).ln() * s[2])
        }
    }

    /// `base ^ (x * scale + shift)`; `base = -1` is `e`.
    pub fn exp() -> Self {
        Self {
            scalars: exp_scalars,
            ..Self::new("exp", 2, 3, |x, s| ((x * s[0] + s[1]) * s[2]).exp())
        }
    }

    /// `x * sigmoid(scale * x)`.
    pub fn swish() -> Self {
        Self {
            scalars: swish_scalars,
            round: RoundMode::Round,
            ..Self::new("swish", 2, 4, |x, s| x / (1.0 + (-s[0] * x).exp()))
        }
    }

    /// GELU, approximated with a sigmoid.
    pub fn gelu() -> Self {
        Self::new("gelu", 2, 4, |x, _| {
            x / (1.0 + (-1.595_769_1 * (x + 0.045_539_924 * x * x * x)).exp())
        })
    }

    pub fn tanh() -> Self {
        Self::new("tanh", 3, 4, |x, _| x.tanh())
    }

    pub fn sqrt() -> Self {
        Self::new("sqrt", 3, 5, |x, _| x.sqrt())
    }

    pub fn rsqrt() -> Self {
        Self::new("rsqrt", 2, 4, |x, _| 1.0 / x.sqrt())
    }

    pub fn reciprocal() -> Self {
        Self::new("reciprocal", 2, 4, |x, _| 1.0 / x)
    }

    fn live_buffers(&self, dtype: DataType) -> u64 {
        match dtype {
            DataType::F32 => self.live_f32,
            DataType::F16 => self.live_f16,
            _ => self.live_other,
        }
    }
}

/// The per-tile transform of a [`Unary`], bound to decoded scalars.
struct UnaryKernel {
    precision: WorkingPrecision,
    scalars: Scalars,
    apply: fn(f32, &Scalars) -> f32,
}

impl<T: Element> ElementwiseKernel<T> for UnaryKernel {
    fn arity(&self) -> usize {
        1
    }

    fn scratch_lanes(&self) -> usize {
        1
    }

    fn compute(&self, inputs: &[&[T]], output: &mut [T], scratch: &mut ScratchBuffer) {
        let (apply, s) = (self.apply, &self.scalars);
        self.precision
            .map_unary(inputs[0], output, scratch, |v| apply(v, s));
    }
}

impl Operator for Unary {
    fn name(&self) -> &'static str {
        self.name
    }

    fn supported_dtypes(&self, hw: &HardwareSpec) -> Vec<DataType> {
        for_target(FLOATS, hw)
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
        attrs: &Attrs,
        hw: &HardwareSpec,
    ) -> Result<TilingPlan, OpError> {
        expect_inputs(self.name, inputs, 1)?;
        let x = &inputs[0];
        check_dtype(self, x.dtype(), hw)?;
        let scalars = (self.scalars)(attrs)?;
        plan_stream(x, self.live_buffers(x.dtype()), scalars, hw)
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
        let kernel = UnaryKernel {
            precision: WorkingPrecision::new(self.round),
            scalars: blob_scalars(blob)?,
            apply: self.apply,
        };
        dispatch!(self.name, inputs[0], [F16, F32, BF16], |x| {
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
