//! Host-side tensors with typed storage.

use std::fmt;

use half::{bf16, f16};
use ubflow_ir::{Complex, DataType, Shape, TensorDescriptor};

use crate::OpError;

/// Element storage for each supported data type.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F16(Vec<f16>),
    F32(Vec<f32>),
    BF16(Vec<bf16>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
    Bool(Vec<bool>),
    Complex64(Vec<Complex>),
}

impl TensorData {
    /// Element type of the storage.
    pub fn dtype(&self) -> DataType {
        match self {
            Self::F16(_) => DataType::F16,
            Self::F32(_) => DataType::F32,
            Self::BF16(_) => DataType::BF16,
            Self::I8(_) => DataType::I8,
            Self::I16(_) => DataType::I16,
            Self::I32(_) => DataType::I32,
            Self::I64(_) => DataType::I64,
            Self::U8(_) => DataType::U8,
            Self::Bool(_) => DataType::Bool,
            Self::Complex64(_) => DataType::Complex64,
        }
    }

    /// Number of stored elements.
    pub fn len(&self) -> usize {
        match self {
            Self::F16(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::BF16(v) => v.len(),
            Self::I8(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::U8(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::Complex64(v) => v.len(),
        }
    }

    /// Returns `true` when no elements are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rust element types that can back a [`TensorData`].
pub trait Storage: Copy + Default + Send + Sync + 'static {
    const DTYPE: DataType;

    /// Borrows the elements if `data` holds this type.
    fn view(data: &TensorData) -> Option<&[Self]>;

    /// Wraps a vector of this type.
    fn wrap(values: Vec<Self>) -> TensorData;
}

macro_rules! storage {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl Storage for $ty {
            const DTYPE: DataType = DataType::$variant;

            fn view(data: &TensorData) -> Option<&[Self]> {
                match data {
                    TensorData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn wrap(values: Vec<Self>) -> TensorData {
                TensorData::$variant(values)
            }
        }
    )*};
}

storage!(
    f16 => F16,
    f32 => F32,
    bf16 => BF16,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    bool => Bool,
    Complex => Complex64,
);

/// A tensor held in host memory.
#[derive(Debug, Clone, PartialEq)]
pub struct HostTensor {
    desc: TensorDescriptor,
    data: TensorData,
}

impl HostTensor {
    /// Binds data to a shape, checking the element count.
    pub fn new(shape: Shape, data: TensorData) -> Result<Self, OpError> {
        let desc = TensorDescriptor::new(shape, data.dtype())?;
        if desc.element_count() != data.len() as u64 {
            return Err(OpError::DataMismatch {
                dtype: data.dtype(),
                expected: desc.element_count(),
                actual: data.len() as u64,
            });
        }
        Ok(Self { desc, data })
    }

    /// A one-dimensional tensor of typed values.
    pub fn from_vec<T: Storage>(values: Vec<T>) -> Self {
        let desc = TensorDescriptor::vector(values.len() as u64, T::DTYPE);
        Self {
            desc,
            data: T::wrap(values),
        }
    }

    /// A tensor of typed values with the given shape.
    pub fn from_shape_vec<T: Storage>(shape: Shape, values: Vec<T>) -> Result<Self, OpError> {
        Self::new(shape, T::wrap(values))
    }

    /// Deterministic test data for `desc`: a ramp over `[-2, 2)` for floats,
    /// counting values for integers, alternating `false, true` for booleans.
    pub fn ramp(desc: &TensorDescriptor) -> Result<Self, OpError> {
        let n = desc.element_count() as usize;
        let at = |i: usize| -2.0 + 4.0 * i as f32 / n.max(1) as f32;
        let data = match desc.dtype() {
            DataType::F16 => TensorData::F16((0..n).map(|i| f16::from_f32(at(i))).collect()),
            DataType::F32 => TensorData::F32((0..n).map(at).collect()),
            DataType::BF16 => TensorData::BF16((0..n).map(|i| bf16::from_f32(at(i))).collect()),
            DataType::I8 => TensorData::I8((0..n).map(|i| (i % 7) as i8 - 3).collect()),
            DataType::I16 => TensorData::I16((0..n).map(|i| (i % 101) as i16 - 50).collect()),
            DataType::I32 => TensorData::I32((0..n).map(|i| (i % 1001) as i32 - 500).collect()),
            DataType::I64 => TensorData::I64((0..n).map(|i| i as i64 - 500).collect()),
            DataType::U8 => TensorData::U8((0..n).map(|i| (i % 251) as u8).collect()),
            DataType::Bool => TensorData::Bool((0..n).map(|i| i % 2 == 1).collect()),
            DataType::Complex64 => {
                TensorData::Complex64((0..n).map(|i| Complex::new(at(i), 1.0)).collect())
            }
            DataType::Complex32 => {
                return Err(OpError::UnsupportedDtype {
                    op: "ramp".to_string(),
                    dtype: DataType::Complex32,
                    target: "host".to_string(),
                });
            }
        };
        Self::new(desc.shape().clone(), data)
    }

    /// The tensor's descriptor.
    pub fn desc(&self) -> &TensorDescriptor {
        &self.desc
    }

    /// Element type.
    pub fn dtype(&self) -> DataType {
        self.desc.dtype()
    }

    /// Shape.
    pub fn shape(&self) -> &Shape {
        self.desc.shape()
    }

    /// The element storage.
    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Typed element slice, or `None` if `T` is not the element type.
    pub fn as_slice<T: Storage>(&self) -> Option<&[T]> {
        T::view(&self.data)
    }

    /// Elements widened to `f64` for display and comparison.
    ///
    /// Complex elements contribute their real part.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match &self.data {
            TensorData::F16(v) => v.iter().map(|x| f64::from(x.to_f32())).collect(),
            TensorData::F32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            TensorData::BF16(v) => v.iter().map(|x| f64::from(x.to_f32())).collect(),
            TensorData::I8(v) => v.iter().map(|&x| f64::from(x)).collect(),
            TensorData::I16(v) => v.iter().map(|&x| f64::from(x)).collect(),
            TensorData::I32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            TensorData::I64(v) => v.iter().map(|&x| x as f64).collect(),
            TensorData::U8(v) => v.iter().map(|&x| f64::from(x)).collect(),
            TensorData::Bool(v) => v.iter().map(|&x| f64::from(u8::from(x))).collect(),
            TensorData::Complex64(v) => v.iter().map(|c| f64::from(c.re)).collect(),
        }
    }
}

impl fmt::Display for HostTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const SHOWN: usize = 8;
        write!(f, "{} [", self.desc)?;
        let values = self.to_f64_vec();
        for (i, v) in values.iter().take(SHOWN).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{v:.6}")?;
        }
        if values.len() > SHOWN {
            write!(f, ", ... ({} more)", values.len() - SHOWN)?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_count_must_match() {
        let err = HostTensor::new(Shape::new(vec![2, 2]).unwrap(), TensorData::F32(vec![1.0]))
            .unwrap_err();
        assert_eq!(
            err,
            OpError::DataMismatch {
                dtype: DataType::F32,
                expected: 4,
                actual: 1
            }
        );
    }

    #[test]
    fn typed_views() {
        let t = HostTensor::from_vec(vec![1i32, 2, 3]);
        assert_eq!(t.dtype(), DataType::I32);
        assert_eq!(t.as_slice::<i32>(), Some(&[1, 2, 3][..]));
        assert!(t.as_slice::<f32>().is_none());
    }

    #[test]
    fn ramp_is_deterministic() {
        let desc = TensorDescriptor::vector(4, DataType::F32);
        let a = HostTensor::ramp(&desc).unwrap();
        assert_eq!(a, HostTensor::ramp(&desc).unwrap());
        assert_eq!(a.as_slice::<f32>().unwrap(), &[-2.0, -1.0, 0.0, 1.0]);
    }

    #[test]
    fn display_truncates() {
        let t = HostTensor::from_vec((0..10).map(|v| v as f32).collect());
        let s = format!("{t}");
        assert!(s.starts_with("tensor<[10], float32> [0.000000, 1.000000"));
        assert!(s.ends_with("... (2 more)]"));
    }
}
