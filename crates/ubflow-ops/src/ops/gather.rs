//! Gather of slices along the first non-batch axis.

use ubflow_ir::{DataType, Shape, TensorDescriptor};
use ubflow_kernel::{GatherIndex, GatherLayout, LaunchOptions, launch_gather};
use ubflow_tiling::{HardwareSpec, TilingPlan};

use crate::operator::{check_dtype, dispatch, expect_inputs, plan_stream};
use crate::{Attrs, Execution, HostTensor, OpError, Operator, Storage};

/// Resolved geometry of one gather.
struct Geometry {
    layout: GatherLayout,
    output: Shape,
}

fn product(dims: &[u64]) -> Result<u64, OpError> {
    Ok(Shape::new(dims)?.element_count()?)
}

/// Validates `x` and `indices` against `batch_dims` and flattens them.
fn geometry(
    x: &TensorDescriptor,
    indices: &TensorDescriptor,
    attrs: &Attrs,
) -> Result<Geometry, OpError> {
    let (xd, id) = (x.shape().dims(), indices.shape().dims());
    let raw = attrs.i64_or("batch_dims", 0)?;
    let batch_dims = if raw < 0 { raw + id.len() as i64 } else { raw };
    if batch_dims < 0 || batch_dims as usize >= xd.len() || batch_dims as usize > id.len() {
        return Err(OpError::invalid_attr(
            "batch_dims",
            format!(
                "{raw} is out of range for data rank {} and indices rank {}",
                xd.len(),
                id.len()
            ),
        ));
    }
    let b = batch_dims as usize;
    if xd[..b] != id[..b] {
        return Err(OpError::ShapeMismatch {
            op: "gather".to_string(),
            expected: Shape::new(&xd[..b])?,
            actual: Shape::new(&id[..b])?,
        });
    }

    let slice_length = product(&xd[b + 1..])?;
    let axis_length = xd[b];
    let layout = GatherLayout {
        batch_length: product(&xd[b..])?,
        indices_length: product(&id[b..])?,
        slice_length,
        axis_length,
    };
    let dims: Vec<u64> = xd[..b]
        .iter()
        .chain(&id[b..])
        .chain(&xd[b + 1..])
        .copied()
        .collect();
    Ok(Geometry {
        layout,
        output: Shape::new(dims)?,
    })
}

fn check_indices(dtype: DataType) -> Result<(), OpError> {
    match dtype {
        DataType::I32 | DataType::I64 => Ok(()),
        other => Err(OpError::UnsupportedDtype {
            op: "gather indices".to_string(),
            dtype: other,
            target: "any".to_string(),
        }),
    }
}

fn gather_typed<T: Storage, I: GatherIndex>(
    blob: &[u8],
    layout: &GatherLayout,
    source: &[T],
    indices: &[I],
    out: &TensorDescriptor,
    options: &LaunchOptions,
) -> Result<Execution, OpError> {
    let mut y = vec![T::default(); out.element_count() as usize];
    let report = launch_gather(blob, layout, source, indices, &mut y, options)?;
    Ok(Execution {
        outputs: vec![HostTensor::from_shape_vec(out.shape().clone(), y)?],
        report,
    })
}

/// Gathers slices of `x` along axis `batch_dims` using `indices`.
///
/// With `b = batch_dims` the output shape is
/// `x[..b] ++ indices[b..] ++ x[b + 1..]`; the leading `b` dimensions of both
/// inputs must agree. A negative `batch_dims` counts from the indices rank.
/// Every index must lie in `[0, x[b])`, checked while the kernel runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gather;

impl Operator for Gather {
    fn name(&self) -> &'static str {
        "gather"
    }

    fn supported_dtypes(&self, _hw: &HardwareSpec) -> Vec<DataType> {
        vec![
            DataType::F16,
            DataType::F32,
            DataType::BF16,
            DataType::I8,
            DataType::I16,
            DataType::I32,
            DataType::I64,
            DataType::U8,
            DataType::Bool,
        ]
    }

    fn infer(
        &self,
        inputs: &[TensorDescriptor],
        attrs: &Attrs,
    ) -> Result<Vec<TensorDescriptor>, OpError> {
        expect_inputs(self.name(), inputs, 2)?;
        check_indices(inputs[1].dtype())?;
        let geometry = geometry(&inputs[0], &inputs[1], attrs)?;
        Ok(vec![TensorDescriptor::new(
            geometry.output,
            inputs[0].dtype(),
        )?])
    }

    fn tiling(
        &self,
        inputs: &[TensorDescriptor],
        attrs: &Attrs,
        hw: &HardwareSpec,
    ) -> Result<TilingPlan, OpError> {
        self.infer(inputs, attrs)?;
        check_dtype(self, inputs[0].dtype(), hw)?;
        plan_stream(&inputs[1], 2, Default::default(), hw)
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
        let (x, indices) = (&inputs[0], &inputs[1]);
        let Geometry { layout, .. } = geometry(x.desc(), indices.desc(), attrs)?;
        let out = &outputs[0];
        dispatch!(self.name(), indices, [I32, I64], |idx| {
            dispatch!(
                self.name(),
                x,
                [F16, F32, BF16, I8, I16, I32, I64, U8, Bool],
                |src| gather_typed(blob, &layout, src.as_slice(), idx.as_slice(), out, options)
            )
        })
    }
}
