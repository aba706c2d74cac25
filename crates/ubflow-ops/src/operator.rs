//! The operator interface and helpers shared by the catalogue.

use std::fmt::{self, Debug};

use ubflow_ir::{DataType, TensorDescriptor};
use ubflow_kernel::{LaunchOptions, LaunchReport};
use ubflow_tiling::{HardwareSpec, SCALAR_SLOTS, TilingPlan, TilingRequest, plan};

use crate::{Attrs, HostTensor, OpError, Storage};

/// One tensor operator: shape inference, tiling and execution.
pub trait Operator: Debug + Send + Sync {
    /// Operator name (e.g. "log").
    fn name(&self) -> &'static str;

    /// Element types accepted for the streamed input on `hw`.
    fn supported_dtypes(&self, hw: &HardwareSpec) -> Vec<DataType>;

    /// Output descriptors for the given inputs.
    fn infer(
        &self,
        inputs: &[TensorDescriptor],
        attrs: &Attrs,
    ) -> Result<Vec<TensorDescriptor>, OpError>;

    /// Computes the tiling plan for one launch.
    fn tiling(
        &self,
        inputs: &[TensorDescriptor],
        attrs: &Attrs,
        hw: &HardwareSpec,
    ) -> Result<TilingPlan, OpError>;

    /// Runs the kernel for a serialized plan.
    ///
    /// `outputs` are the descriptors returned by [`Operator::infer`].
    fn execute(
        &self,
        blob: &[u8],
        inputs: &[HostTensor],
        outputs: &[TensorDescriptor],
        attrs: &Attrs,
        options: &LaunchOptions,
    ) -> Result<Execution, OpError>;
}

/// Tensors and per-core report produced by [`Operator::execute`].
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// Output tensors, in the order of [`Operator::infer`].
    pub outputs: Vec<HostTensor>,
    /// Per-core launch report.
    pub report: LaunchReport,
}

impl fmt::Display for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.report)?;
        for out in &self.outputs {
            writeln!(f, "  {out}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Shared checks
// ---------------------------------------------------------------------------

/// Drops `bf16` from `dtypes` when `hw` cannot compute in it.
pub(crate) fn for_target(dtypes: &[DataType], hw: &HardwareSpec) -> Vec<DataType> {
    dtypes
        .iter()
        .copied()
        .filter(|&d| d != DataType::BF16 || hw.supports_bf16)
        .collect()
}

/// Checks the input count.
pub(crate) fn expect_inputs<T>(op: &str, inputs: &[T], expected: usize) -> Result<(), OpError> {
    if inputs.len() != expected {
        return Err(OpError::InputCount {
            op: op.to_string(),
            expected,
            actual: inputs.len(),
        });
    }
    Ok(())
}

/// Checks that `dtype` is accepted by `op` on `hw`.
pub(crate) fn check_dtype(
    op: &dyn Operator,
    dtype: DataType,
    hw: &HardwareSpec,
) -> Result<(), OpError> {
    if op.supported_dtypes(hw).contains(&dtype) {
        Ok(())
    } else {
        Err(OpError::UnsupportedDtype {
            op: op.name().to_string(),
            dtype,
            target: hw.name.clone(),
        })
    }
}

/// Checks that `other` has the same shape and dtype as `first`.
pub(crate) fn check_same(
    op: &str,
    first: &TensorDescriptor,
    other: &TensorDescriptor,
) -> Result<(), OpError> {
    if other.dtype() != first.dtype() {
        return Err(OpError::DtypeMismatch {
            op: op.to_string(),
            expected: first.dtype(),
            actual: other.dtype(),
        });
    }
    if other.shape() != first.shape() {
        return Err(OpError::ShapeMismatch {
            op: op.to_string(),
            expected: first.shape().clone(),
            actual: other.shape().clone(),
        });
    }
    Ok(())
}

/// Plans a launch streaming `desc` with `live_buffers` tile-sized buffers.
pub(crate) fn plan_stream(
    desc: &TensorDescriptor,
    live_buffers: u64,
    scalars: [f32; SCALAR_SLOTS],
    hw: &HardwareSpec,
) -> Result<TilingPlan, OpError> {
    let request = TilingRequest::new(
        desc.element_count(),
        desc.dtype().size_in_bytes(),
        live_buffers,
    )
    .with_scalars(scalars);
    Ok(plan(&request, hw)?)
}

/// Typed view of an input tensor whose type was already dispatched on.
pub(crate) fn typed<'t, T: Storage>(op: &str, tensor: &'t HostTensor) -> Result<&'t [T], OpError> {
    tensor.as_slice::<T>().ok_or_else(|| OpError::DtypeMismatch {
        op: op.to_string(),
        expected: T::DTYPE,
        actual: tensor.dtype(),
    })
}

/// Runs `$body` with `$v` bound to the typed storage of `$tensor`, for each
/// listed [`TensorData`](crate::TensorData) variant.
macro_rules! dispatch {
    ($op:expr, $tensor:expr, [$($variant:ident),+ $(,)?], |$v:ident| $body:expr) => {
        match $tensor.data() {
            $($crate::TensorData::$variant($v) => $body,)+
            #[allow(unreachable_patterns)]
            other => Err($crate::OpError::UnsupportedDtype {
                op: $op.to_string(),
                dtype: other.dtype(),
                target: "host".to_string(),
            }),
        }
    };
}

pub(crate) use dispatch;
