//! Built-in operators.

mod gather;
mod logical;
mod loss;
mod native;
mod pointwise;
mod unary;

pub use gather::Gather;
pub use logical::{LogicalNot, LogicalOr};
pub use loss::MseLoss;
pub use native::{ClipByValue, Muls, Sign};
pub use pointwise::{Addcdiv, Addcmul, Heaviside, Lerp};
pub use unary::Unary;

use std::borrow::Cow;

use ubflow_ir::{Shape, TensorDescriptor};
use ubflow_kernel::{ElementwiseKernel, LaunchOptions, Operand, launch_elementwise};
use ubflow_tiling::{SCALAR_SLOTS, TilingPlan};

use crate::{Execution, HostTensor, OpError, Storage};

/// Every built-in operator, in catalogue order.
pub fn builtins() -> Vec<Box<dyn crate::Operator>> {
    vec![
        Box::new(Unary::log()),
        Box::new(Unary::exp()),
        Box::new(Unary::swish()),
        Box::new(Unary::gelu()),
        Box::new(Unary::tanh()),
        Box::new(Unary::sqrt()),
        Box::new(Unary::rsqrt()),
        Box::new(Unary::reciprocal()),
        Box::new(Sign::abs()),
        Box::new(Sign::neg()),
        Box::new(Muls),
        Box::new(ClipByValue),
        Box::new(LogicalNot),
        Box::new(LogicalOr),
        Box::new(Heaviside),
        Box::new(Addcdiv),
        Box::new(Addcmul),
        Box::new(Lerp),
        Box::new(MseLoss),
        Box::new(Gather),
    ]
}

/// Launches an elementwise kernel and wraps the result as `out`.
pub(crate) fn run_elementwise<T, K>(
    blob: &[u8],
    kernel: &K,
    inputs: &[Operand<'_, T>],
    out: &TensorDescriptor,
    options: &LaunchOptions,
) -> Result<Execution, OpError>
where
    T: Storage,
    K: ElementwiseKernel<T>,
{
    let mut y = vec![T::default(); out.element_count() as usize];
    let report = launch_elementwise(blob, kernel, inputs, &mut y, options)?;
    let output = HostTensor::from_shape_vec(out.shape().clone(), y)?;
    Ok(Execution {
        outputs: vec![output],
        report,
    })
}

/// Operator scalars carried in a serialized plan.
pub(crate) fn blob_scalars(blob: &[u8]) -> Result<[f32; SCALAR_SLOTS], OpError> {
    Ok(TilingPlan::from_bytes(blob)?.scalars)
}

/// A tensor operand, or a broadcast scalar when the tensor has one element
/// and the output more than one.
pub(crate) fn broadcast<'a, T: Copy>(values: &'a [T], total: u64) -> Operand<'a, T> {
    match values {
        [v] if total != 1 => Operand::Scalar(*v),
        _ => Operand::Tensor(values),
    }
}

/// `values` of shape `from` laid out row-major at shape `to`.
///
/// Borrows when no copy is needed: equal shapes, or a single element that
/// [`broadcast`] turns into a scalar. `from` must broadcast to `to`.
pub(crate) fn expand<'a, T: Copy>(values: &'a [T], from: &Shape, to: &Shape) -> Cow<'a, [T]> {
    if from == to || values.len() == 1 {
        return Cow::Borrowed(values);
    }
    let dims = to.dims();
    let rank = dims.len();
    let pad = rank - from.rank();
    // Source stride per output axis; zero along stretched axes.
    let mut strides = vec![0u64; rank];
    let mut stride = 1;
    for (axis, &d) in from.dims().iter().enumerate().rev() {
        if d != 1 {
            strides[pad + axis] = stride;
        }
        stride *= d;
    }
    let total: u64 = dims.iter().product();
    let mut index = vec![0u64; rank];
    let mut out = Vec::with_capacity(total as usize);
    for _ in 0..total {
        let src: u64 = index.iter().zip(&strides).map(|(i, s)| i * s).sum();
        out.push(values[src as usize]);
        for axis in (0..rank).rev() {
            index[axis] += 1;
            if index[axis] < dims[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
    Cow::Owned(out)
}
